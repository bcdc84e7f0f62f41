//! Integration test: agents and clocks on separate threads.
//!
//! Verifies that concurrent agents sharing one environment never lose
//! updates, that observations taken while a tick driver runs are always
//! whole-tick views, and that drivers shut down at their boundaries.

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use dyad_core::{ComponentError, Decision, State, Value};
use dyad_engine::{
    Agent, AgentConfig, AgentDriver, ClockConfig, Environment, EnvironmentConfig,
    EnvironmentDriver, Phase,
};
use dyad_plugin::{Component, EnvironmentComponent, TickContext};
use dyad_test_utils::{increment, Counter, ScriptedPolicy};

fn counter_env() -> Arc<Environment> {
    Arc::new(
        Environment::new(EnvironmentConfig::default().with_component("counter", Counter::new()))
            .unwrap(),
    )
}

fn one_shot(name: &str, env: &Arc<Environment>) -> Agent {
    let policy = ScriptedPolicy::new([increment("counter", 1)]);
    Agent::new(AgentConfig::new(name, policy, Arc::clone(env))).unwrap()
}

#[test]
fn two_agents_increment_once_each() {
    let env = counter_env();
    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = ["left", "right"]
        .into_iter()
        .map(|name| {
            let mut agent = one_shot(name, &env);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                agent.cycle();
                agent
            })
        })
        .collect();
    for h in handles {
        let agent = h.join().unwrap();
        assert_eq!(agent.metrics().actions_ok, 1);
    }
    assert_eq!(env.observe().unwrap().get("count"), Some(&Value::from(2)));
}

#[test]
fn many_agents_lose_no_updates() {
    const AGENTS: usize = 8;
    const CYCLES: usize = 50;

    let env = counter_env();
    let handles: Vec<_> = (0..AGENTS)
        .map(|i| {
            let policy = ScriptedPolicy::new(vec![increment("counter", 1); CYCLES]);
            let mut agent =
                Agent::new(AgentConfig::new(format!("agent-{i}"), policy, Arc::clone(&env)))
                    .unwrap();
            thread::spawn(move || {
                for _ in 0..CYCLES {
                    agent.cycle();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(
        env.observe().unwrap().get("count"),
        Some(&Value::from((AGENTS * CYCLES) as i64))
    );
}

/// Two keys that a tick always moves together.
struct Pair {
    n: u64,
}

impl Component for Pair {
    fn state(&self) -> State {
        let mut s = State::new();
        s.set("left", self.n);
        s.set("right", self.n);
        s
    }
}

impl EnvironmentComponent for Pair {
    fn on_tick(&mut self, _ctx: &TickContext) -> Result<(), ComponentError> {
        self.n += 1;
        Ok(())
    }
}

#[test]
fn agents_observe_whole_ticks_while_driver_runs() {
    let env = Arc::new(
        Environment::new(
            EnvironmentConfig::default()
                .with_component("pair", Pair { n: 0 })
                .with_component("counter", Counter::new()),
        )
        .unwrap(),
    );
    let mut driver = EnvironmentDriver::start(
        Arc::clone(&env),
        ClockConfig {
            rate_hz: 2000.0,
            report_capacity: 1,
        },
    )
    .unwrap();

    let policy = ScriptedPolicy::new(vec![increment("counter", 1); 20]);
    let seen = policy.seen();
    let mut agent = Agent::new(AgentConfig::new("watcher", policy, Arc::clone(&env))).unwrap();
    for _ in 0..40 {
        agent.cycle();
    }
    let report = driver.shutdown();
    assert!(report.tick_joined);

    for state in seen.lock().unwrap().iter() {
        assert_eq!(state.get("environment/left"), state.get("environment/right"));
    }
    assert_eq!(env.observe().unwrap().get("count"), Some(&Value::from(20)));
}

#[test]
fn agent_drivers_run_against_a_ticking_environment() {
    let env = counter_env();
    let mut tick_driver = EnvironmentDriver::start(Arc::clone(&env), ClockConfig::default()).unwrap();
    let clock = ClockConfig {
        rate_hz: 1000.0,
        report_capacity: 1,
    };
    let drivers: Vec<AgentDriver> = ["a", "b", "c"]
        .into_iter()
        .map(|name| {
            let policy = ScriptedPolicy::new(vec![increment("counter", 1); 5]);
            let agent = Agent::new(AgentConfig::new(name, policy, Arc::clone(&env))).unwrap();
            AgentDriver::start(agent, clock.clone()).unwrap()
        })
        .collect();

    // Each script is five increments followed by idling.
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    while env.observe().unwrap().get("count") != Some(&Value::from(15)) {
        assert!(std::time::Instant::now() < deadline, "agents stalled");
        thread::sleep(Duration::from_millis(2));
    }

    for driver in drivers {
        let agent = driver.shutdown().unwrap();
        assert_eq!(agent.phase(), Phase::Observing);
        assert_eq!(agent.metrics().actions_ok, 5);
    }
    tick_driver.shutdown();
}

#[test]
fn stop_handle_ends_run_from_another_thread() {
    let env = counter_env();
    let policy = ScriptedPolicy::new([Decision::idle(3.0)]);
    let mut agent = Agent::new(AgentConfig::new("runner", policy, env)).unwrap();
    let stop = agent.stop_handle();
    let runner = thread::spawn(move || {
        let metrics = agent.run();
        (agent, metrics)
    });
    thread::sleep(Duration::from_millis(10));
    stop.stop();
    let (agent, metrics) = runner.join().unwrap();
    assert_eq!(agent.phase(), Phase::Observing);
    assert_eq!(metrics.steps, agent.metrics().steps);
    assert!(metrics.cycles >= 1);
}
