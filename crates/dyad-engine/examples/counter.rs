//! Counter demo: one environment ticking on its own thread, two agents
//! racing to push a shared counter to a target.
//!
//! ```text
//! RUST_LOG=dyad_engine=debug cargo run -p dyad-engine --example counter
//! ```

use std::error::Error;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use dyad_core::{ActionSet, Decision, State, Value};
use dyad_engine::{
    Agent, AgentConfig, AgentDriver, ClockConfig, ConfigError, Environment, EnvironmentConfig,
    EnvironmentDriver,
};
use dyad_plugin::FnPolicy;
use dyad_test_utils::{increment, Counter, HeartbeatProbe};
use tracing::info;

const TARGET: i64 = 10;

fn climber(name: &str, env: &Arc<Environment>) -> Result<Agent, ConfigError> {
    let policy = FnPolicy::new("climb", |state: &State, _actions: &ActionSet| {
        match state.get("environment/count").and_then(Value::as_i64) {
            Some(n) if n >= TARGET => Decision::idle(5.0),
            _ => increment("counter", 1),
        }
    });
    let config = AgentConfig::new(name, policy, Arc::clone(env))
        .with_component("pulse", HeartbeatProbe::new())
        .with_heartbeat_dt(0.5);
    Agent::new(config)
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dyad_engine=info".into()),
        )
        .init();

    let env = Arc::new(Environment::new(
        EnvironmentConfig::default()
            .with_component("counter", Counter::new())
            .with_period(0.1),
    )?);

    let clock = ClockConfig {
        rate_hz: 100.0,
        report_capacity: 16,
    };
    let mut ticks = EnvironmentDriver::start(Arc::clone(&env), clock.clone())?;
    let drivers = ["ada", "bo"]
        .into_iter()
        .map(|name| AgentDriver::start(climber(name, &env)?, clock.clone()))
        .collect::<Result<Vec<AgentDriver>, ConfigError>>()?;

    while env
        .observe()
        .ok()
        .and_then(|s| s.get("count").and_then(Value::as_i64))
        .is_some_and(|n| n < TARGET)
    {
        thread::sleep(Duration::from_millis(10));
    }

    for driver in drivers {
        match driver.shutdown() {
            Ok(agent) => info!(
                agent = agent.name(),
                cycles = agent.metrics().cycles,
                actions = agent.metrics().actions_ok,
                failed = agent.metrics().actions_failed,
                "agent finished"
            ),
            Err(e) => info!(error = %e, "agent lost"),
        }
    }
    let report = ticks.shutdown();
    info!(
        ticks = report.ticks,
        dropped = report.dropped_reports,
        count = ?env.observe().ok().and_then(|s| s.get("count").cloned()),
        "done"
    );
    Ok(())
}
