//! The [`Agent`] and its observe/think/act/idle phase machine.
//!
//! # Phases
//!
//! ```text
//!            ┌──────────── ACTING ◄──── ActionRequest ─┐
//!            ▼                                         │
//!   ──► OBSERVING ───────────► THINKING ───────────────┤
//!            ▲                                         │
//!            └──────────── IDLE ◄──────── Idle(d) ─────┘
//! ```
//!
//! Each [`step()`](Agent::step) executes exactly one phase and moves to the
//! next. One heartbeat of `heartbeat_dt` logical time passes per step.
//! Steps outside `IDLE` first deliver `on_heartbeat` to every agent
//! component; idle steps advance nothing, so `Idle(d)` holds the agent for
//! `ceil(d / heartbeat_dt)` steps (at least one) before it observes again.
//!
//! A stop request is honored only at the top of `OBSERVING`: a cycle in
//! progress always completes.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dyad_core::{
    ActionError, ActionId, ActionRequest, ActionSet, BeatId, ComponentId, Decision, Domain,
    OnConflict, State, TickId, Value,
};
use dyad_plugin::{AgentComponent, ComponentRegistry, HeartbeatContext, Policy};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::{AgentConfig, ConfigError};
use crate::environment::Environment;
use crate::metrics::AgentMetrics;

/// Reserved keys and prefixes in agent state.
pub mod keys {
    /// Current phase name.
    pub const PHASE: &str = "agent/phase";
    /// Tick of the last observation.
    pub const TICK: &str = "agent/tick";
    /// Id of the last requested action.
    pub const ACTION: &str = "agent/action";
    /// Arguments of the last requested action.
    pub const ACTION_ARGS: &str = "agent/action/args";
    /// Value returned by the last successful action.
    pub const ACTION_RESULT: &str = "agent/action/result";
    /// Rationale attached to the last request.
    pub const THOUGHTS: &str = "agent/thoughts";
    /// `{ "kind", "message" }` of the last failure.
    pub const ERROR: &str = "agent/error";
    /// Prefix of the last environment observation.
    pub const ENVIRONMENT: &str = "environment/";
    /// Prefix of the agent's own component snapshots.
    pub const COMPONENTS: &str = "components/";
}

// ── Phase ──────────────────────────────────────────────────────────

/// The agent's current phase. Exactly one is active at any time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Pull the environment's aggregate state into agent state.
    Observing,
    /// Ask the policy for a directive.
    Thinking,
    /// Resolve and invoke the requested action.
    Acting,
    /// Hold without advancing anything.
    Idle,
}

impl Phase {
    /// Lowercase name, as stored under `agent/phase`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Observing => "observing",
            Self::Thinking => "thinking",
            Self::Acting => "acting",
            Self::Idle => "idle",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase plus the data carried from `THINKING` into the next phase.
enum Stage {
    Observing,
    Thinking,
    Acting {
        request: ActionRequest,
        actions: ActionSet,
    },
    Idle {
        remaining: u64,
    },
}

impl Stage {
    fn phase(&self) -> Phase {
        match self {
            Self::Observing => Phase::Observing,
            Self::Thinking => Phase::Thinking,
            Self::Acting { .. } => Phase::Acting,
            Self::Idle { .. } => Phase::Idle,
        }
    }
}

// ── Reports ────────────────────────────────────────────────────────

/// What a single step did.
#[derive(Clone, Debug, PartialEq)]
pub enum StepOutcome {
    /// The stop signal was raised; nothing ran.
    Stopped,
    /// Observed the environment after `tick`, or failed to.
    Observed {
        /// The tick the observation reflects, if one was taken.
        tick: Option<TickId>,
    },
    /// The policy returned this directive.
    Decided(Decision),
    /// The requested action ran (or failed to).
    Acted {
        /// The requested action.
        action: ActionId,
        /// Its result.
        result: Result<Value, ActionError>,
    },
    /// One idle heartbeat passed.
    Idled {
        /// Idle steps still to go before observing.
        remaining: u64,
    },
}

/// Report from one [`Agent::step`].
#[derive(Clone, Debug, PartialEq)]
pub struct StepReport {
    /// The phase this step executed.
    pub phase: Phase,
    /// The phase the agent is in afterwards.
    pub next: Phase,
    /// What happened.
    pub outcome: StepOutcome,
}

/// Shared flag that asks an agent to stop at its next `OBSERVING` boundary.
#[derive(Clone, Debug, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Raise the stop signal.
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether the stop signal is raised.
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Lower the stop signal so the agent can run again.
    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}

// ── Agent ──────────────────────────────────────────────────────────

/// An agent: components, a policy, a shared environment, and its own state.
///
/// The phase cycle is strictly sequential (`step` takes `&mut self`); run
/// several agents in parallel by giving each its own thread, for example
/// with [`AgentDriver`](crate::realtime::AgentDriver).
pub struct Agent {
    name: String,
    registry: ComponentRegistry<dyn AgentComponent>,
    policy: Box<dyn Policy>,
    environment: Arc<Environment>,
    state: State,
    stage: Stage,
    heartbeat_dt: f64,
    beat: BeatId,
    clock: f64,
    stop: StopHandle,
    metrics: AgentMetrics,
}

// Compile-time assertion: agents move onto driver threads.
const _: fn() = || {
    fn assert<T: Send>() {}
    assert::<Agent>();
};

impl Agent {
    /// Build an agent in `OBSERVING`, registering its components in order.
    pub fn new(config: AgentConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut registry = ComponentRegistry::new(Domain::Agent);
        for (id, component) in config.components {
            registry.register(id, component)?;
        }
        let mut state = State::new();
        state.set(keys::PHASE, Phase::Observing.as_str());
        info!(
            agent = %config.name,
            policy = config.policy.name(),
            components = registry.len(),
            "agent created"
        );
        Ok(Self {
            name: config.name,
            registry,
            policy: config.policy,
            environment: config.environment,
            state,
            stage: Stage::Observing,
            heartbeat_dt: config.heartbeat_dt,
            beat: BeatId::default(),
            clock: 0.0,
            stop: StopHandle::default(),
            metrics: AgentMetrics::default(),
        })
    }

    /// The agent's label.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The active phase.
    pub fn phase(&self) -> Phase {
        self.stage.phase()
    }

    /// The agent's state.
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Logical time elapsed, in heartbeat units times `heartbeat_dt`.
    pub fn clock(&self) -> f64 {
        self.clock
    }

    /// The shared environment.
    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    /// Cumulative counters.
    pub fn metrics(&self) -> &AgentMetrics {
        &self.metrics
    }

    /// A handle that stops this agent from any thread.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Raise the stop signal.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Swap the policy, returning the old one. Takes effect at the next
    /// `THINKING`.
    pub fn replace_policy(&mut self, policy: Box<dyn Policy>) -> Box<dyn Policy> {
        info!(agent = %self.name, policy = policy.name(), "policy replaced");
        std::mem::replace(&mut self.policy, policy)
    }

    /// Actions the policy can choose from: the agent's own, then the
    /// environment's.
    pub fn available_actions(&self) -> ActionSet {
        self.registry.actions().union(&self.environment.get_actions())
    }

    /// Execute one phase.
    pub fn step(&mut self) -> StepReport {
        let phase = self.phase();
        if phase == Phase::Observing && self.stop.is_stopped() {
            return StepReport {
                phase,
                next: phase,
                outcome: StepOutcome::Stopped,
            };
        }
        if phase != Phase::Idle {
            self.deliver_heartbeats();
        }
        self.metrics.steps += 1;
        self.clock += self.heartbeat_dt;

        let stage = std::mem::replace(&mut self.stage, Stage::Observing);
        let (next, outcome) = match stage {
            Stage::Observing => (Stage::Thinking, self.observe()),
            Stage::Thinking => self.think(),
            Stage::Acting { request, actions } => (Stage::Observing, self.act(request, &actions)),
            Stage::Idle { remaining } => {
                let remaining = remaining.saturating_sub(1);
                let next = if remaining == 0 {
                    Stage::Observing
                } else {
                    Stage::Idle { remaining }
                };
                (next, StepOutcome::Idled { remaining })
            }
        };
        self.stage = next;

        let next = self.phase();
        if next == Phase::Observing {
            self.metrics.cycles += 1;
        }
        self.state.set(keys::PHASE, next.as_str());
        debug!(agent = %self.name, from = %phase, to = %next, "phase transition");
        StepReport {
            phase,
            next,
            outcome,
        }
    }

    /// Step until the agent is back in `OBSERVING`, or the stop signal is
    /// raised. Returns the reports of the steps taken.
    pub fn cycle(&mut self) -> Vec<StepReport> {
        let mut reports = Vec::new();
        loop {
            let report = self.step();
            let done = report.outcome == StepOutcome::Stopped || report.next == Phase::Observing;
            reports.push(report);
            if done {
                return reports;
            }
        }
    }

    /// Step until the stop signal is raised. Returns the cumulative metrics.
    pub fn run(&mut self) -> AgentMetrics {
        info!(agent = %self.name, "agent running");
        while self.step().outcome != StepOutcome::Stopped {}
        info!(agent = %self.name, cycles = self.metrics.cycles, "agent stopped");
        self.metrics.clone()
    }

    // ── Phases ─────────────────────────────────────────────────────

    fn deliver_heartbeats(&mut self) {
        self.beat = BeatId(self.beat.0 + 1);
        let ctx = HeartbeatContext {
            beat: self.beat,
            dt: self.heartbeat_dt,
            agent_state: &self.state,
        };
        let mut failed = 0;
        for cell in self.registry.iter() {
            if let Err(error) = cell.with_mut(|c| c.on_heartbeat(&ctx)) {
                warn!(agent = %self.name, component = %cell.id(), %error, "on_heartbeat failed");
                failed += 1;
            }
        }
        self.metrics.heartbeat_failures += failed;
    }

    fn observe(&mut self) -> StepOutcome {
        self.refresh_component_snapshots();
        match self.environment.observation() {
            Ok(observation) => {
                self.state.clear_prefix(keys::ENVIRONMENT);
                // Overwrite never conflicts.
                let _ = self
                    .state
                    .absorb(&observation.state, keys::ENVIRONMENT, OnConflict::Overwrite);
                self.state.set(keys::TICK, observation.tick.0);
                StepOutcome::Observed {
                    tick: Some(observation.tick),
                }
            }
            Err(e) => {
                warn!(agent = %self.name, error = %e, "observation failed");
                self.metrics.observe_failures += 1;
                self.record_error(e.kind(), &e.to_string());
                StepOutcome::Observed { tick: None }
            }
        }
    }

    fn refresh_component_snapshots(&mut self) {
        self.state.clear_prefix(keys::COMPONENTS);
        let snapshots: Vec<(ComponentId, State)> = self
            .registry
            .iter()
            .map(|cell| (cell.id().clone(), cell.state()))
            .collect();
        for (id, slice) in snapshots {
            let prefix = format!("{}{id}/", keys::COMPONENTS);
            self.state
                .set_nested(&prefix, slice.iter().map(|(k, v)| (k, v.clone())));
        }
    }

    fn think(&mut self) -> (Stage, StepOutcome) {
        let actions = self.available_actions();
        let decision = self.policy.decide(&self.state, &actions);
        let next = match &decision {
            Decision::Act(request) => {
                match &request.thoughts {
                    Some(thoughts) => self.state.set(keys::THOUGHTS, thoughts.clone()),
                    None => {
                        self.state.remove(keys::THOUGHTS);
                    }
                }
                Stage::Acting {
                    request: request.clone(),
                    actions,
                }
            }
            Decision::Idle { duration } => {
                self.metrics.idles += 1;
                Stage::Idle {
                    remaining: self.idle_steps(*duration),
                }
            }
        };
        (next, StepOutcome::Decided(decision))
    }

    fn idle_steps(&self, duration: f64) -> u64 {
        let steps = (duration / self.heartbeat_dt).ceil();
        // NaN and non-positive durations still visit IDLE once.
        if steps.is_nan() || steps < 1.0 {
            1
        } else if steps >= u64::MAX as f64 {
            u64::MAX
        } else {
            steps as u64
        }
    }

    fn act(&mut self, request: ActionRequest, actions: &ActionSet) -> StepOutcome {
        self.state.set(keys::ACTION, request.action.to_string());
        self.state
            .set(keys::ACTION_ARGS, Value::Object(request.args.clone().into_iter().collect()));

        let result = actions
            .resolve(&request.action)
            .and_then(|action| action.invoke(&request.args));
        match &result {
            Ok(value) => {
                self.metrics.actions_ok += 1;
                self.state.set(keys::ACTION_RESULT, value.clone());
                self.state.remove(keys::ERROR);
            }
            Err(e) => {
                warn!(agent = %self.name, action = %request.action, error = %e, "action failed");
                self.metrics.actions_failed += 1;
                self.state.remove(keys::ACTION_RESULT);
                self.record_error(e.kind(), &e.to_string());
            }
        }
        StepOutcome::Acted {
            action: request.action,
            result,
        }
    }

    fn record_error(&mut self, kind: &str, message: &str) {
        self.state
            .set(keys::ERROR, json!({ "kind": kind, "message": message }));
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("phase", &self.phase())
            .field("policy", &self.policy.name())
            .field("registry", &self.registry)
            .field("clock", &self.clock)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnvironmentConfig;
    use dyad_core::{Args, ComponentError, OperationSpec, ParamSchema, ParamSpec, ParamType};
    use dyad_plugin::{Component, EnvironmentComponent, FnPolicy, TickContext};

    struct Tally {
        count: i64,
    }

    impl Component for Tally {
        fn state(&self) -> State {
            [("count", self.count)].into_iter().collect()
        }

        fn operations(&self) -> Vec<OperationSpec> {
            vec![OperationSpec::stateful(
                "add",
                "adds n",
                ParamSchema::new([ParamSpec::required("n", ParamType::Integer)]),
            )]
        }

        fn perform(&mut self, _op: &str, args: &Args) -> Result<Value, ComponentError> {
            self.count += args["n"].as_i64().unwrap_or(0);
            Ok(Value::from(self.count))
        }
    }

    impl EnvironmentComponent for Tally {
        fn on_tick(&mut self, _ctx: &TickContext) -> Result<(), ComponentError> {
            Ok(())
        }
    }

    struct Pulse {
        beats: u64,
        fail: bool,
    }

    impl Component for Pulse {
        fn state(&self) -> State {
            [("beats", self.beats)].into_iter().collect()
        }
    }

    impl AgentComponent for Pulse {
        fn on_heartbeat(&mut self, _ctx: &HeartbeatContext<'_>) -> Result<(), ComponentError> {
            self.beats += 1;
            if self.fail {
                Err(ComponentError::failed("arrhythmia"))
            } else {
                Ok(())
            }
        }
    }

    fn tally_env() -> Arc<Environment> {
        Arc::new(
            Environment::new(EnvironmentConfig::default().with_component("tally", Tally { count: 0 }))
                .unwrap(),
        )
    }

    fn add(n: i64) -> Decision {
        ActionRequest::new(ActionId::environment("tally", "add"))
            .arg("n", n)
            .into()
    }

    fn agent_with(decide: impl FnMut(&State, &ActionSet) -> Decision + Send + 'static) -> Agent {
        let config = AgentConfig::new("a", FnPolicy::new("test", decide), tally_env())
            .with_component("pulse", Pulse { beats: 0, fail: false });
        Agent::new(config).unwrap()
    }

    #[test]
    fn acting_cycle_takes_three_steps() {
        let mut agent = agent_with(|_: &State, _: &ActionSet| add(1));
        let phases: Vec<(Phase, Phase)> = agent.cycle().iter().map(|r| (r.phase, r.next)).collect();
        assert_eq!(
            phases,
            [
                (Phase::Observing, Phase::Thinking),
                (Phase::Thinking, Phase::Acting),
                (Phase::Acting, Phase::Observing),
            ]
        );
        assert_eq!(agent.state().get(keys::ACTION_RESULT), Some(&Value::from(1)));
        assert_eq!(agent.metrics().cycles, 1);
        assert_eq!(agent.state().get(keys::PHASE), Some(&Value::from("observing")));
    }

    #[test]
    fn observation_lands_under_environment_prefix() {
        let mut agent = agent_with(|_: &State, _: &ActionSet| add(2));
        agent.cycle();
        agent.step();
        assert_eq!(agent.state().get("environment/count"), Some(&Value::from(2)));
        assert_eq!(agent.state().get(keys::TICK), Some(&Value::from(0)));
        // Heartbeats run before the phase body, so the snapshot sees all four.
        assert_eq!(
            agent.state().get("components/pulse/beats"),
            Some(&Value::from(4))
        );
    }

    #[test]
    fn idle_holds_without_heartbeats() {
        let mut agent = agent_with(|_: &State, _: &ActionSet| Decision::idle(2.5));
        let reports = agent.cycle();
        // observe, think, then ceil(2.5) = 3 idle steps.
        assert_eq!(reports.len(), 5);
        assert!(reports[2..].iter().all(|r| r.phase == Phase::Idle));
        assert_eq!(agent.clock(), 5.0);
        agent.step();
        // Two non-idle steps before idling plus this observation.
        assert_eq!(
            agent.state().get("components/pulse/beats"),
            Some(&Value::from(3))
        );
    }

    #[test]
    fn zero_idle_still_visits_idle_once() {
        let mut agent = agent_with(|_: &State, _: &ActionSet| Decision::idle(0.0));
        let phases: Vec<Phase> = agent.cycle().iter().map(|r| r.phase).collect();
        assert_eq!(phases, [Phase::Observing, Phase::Thinking, Phase::Idle]);
    }

    #[test]
    fn failures_are_recorded_and_cleared() {
        let mut first = true;
        let mut agent = agent_with(move |_: &State, _: &ActionSet| {
            if std::mem::take(&mut first) {
                ActionRequest::new(ActionId::environment("tally", "nope")).into()
            } else {
                add(1)
            }
        });
        let reports = agent.cycle();
        assert!(matches!(
            &reports[2].outcome,
            StepOutcome::Acted { result: Err(ActionError::UnknownAction { .. }), .. }
        ));
        assert_eq!(agent.phase(), Phase::Observing);
        assert_eq!(
            agent.state().get(keys::ERROR).and_then(|e| e.get("kind")),
            Some(&Value::from("unknown_action"))
        );
        agent.cycle();
        assert!(agent.state().get(keys::ERROR).is_none());
        assert_eq!(agent.metrics().actions_failed, 1);
        assert_eq!(agent.metrics().actions_ok, 1);
    }

    #[test]
    fn invalid_arguments_recorded() {
        let mut agent = agent_with(|_: &State, _: &ActionSet| {
            ActionRequest::new(ActionId::environment("tally", "add"))
                .arg("n", "three")
                .into()
        });
        agent.cycle();
        assert_eq!(
            agent.state().get(keys::ERROR).and_then(|e| e.get("kind")),
            Some(&Value::from("invalid_arguments"))
        );
    }

    #[test]
    fn stop_is_honored_only_when_observing() {
        let mut agent = agent_with(|_: &State, _: &ActionSet| add(1));
        agent.step();
        agent.stop();
        assert_eq!(agent.step().phase, Phase::Thinking);
        assert_eq!(agent.step().phase, Phase::Acting);
        let report = agent.step();
        assert_eq!(report.outcome, StepOutcome::Stopped);
        assert_eq!(agent.metrics().steps, 3);
        assert_eq!(agent.run().cycles, 1);

        agent.stop_handle().reset();
        assert_eq!(agent.step().phase, Phase::Observing);
    }

    #[test]
    fn heartbeat_failures_are_isolated() {
        let config = AgentConfig::new(
            "a",
            FnPolicy::new("nap", |_: &State, _: &ActionSet| Decision::idle(1.0)),
            tally_env(),
        )
        .with_component("bad", Pulse { beats: 0, fail: true })
        .with_component("good", Pulse { beats: 0, fail: false });
        let mut agent = Agent::new(config).unwrap();
        agent.cycle();
        assert_eq!(agent.metrics().heartbeat_failures, 2);
        agent.step();
        assert_eq!(
            agent.state().get("components/good/beats"),
            Some(&Value::from(3))
        );
    }

    #[test]
    fn replace_policy_takes_effect_next_think() {
        let mut agent = agent_with(|_: &State, _: &ActionSet| add(1));
        let old = agent.replace_policy(Box::new(FnPolicy::new("nap", |_: &State, _: &ActionSet| {
            Decision::idle(1.0)
        })));
        assert_eq!(old.name(), "test");
        let phases: Vec<Phase> = agent.cycle().iter().map(|r| r.phase).collect();
        assert_eq!(phases, [Phase::Observing, Phase::Thinking, Phase::Idle]);
    }

    #[test]
    fn agent_actions_precede_environment_actions() {
        struct Voice;
        impl Component for Voice {
            fn state(&self) -> State {
                State::new()
            }
            fn operations(&self) -> Vec<OperationSpec> {
                vec![OperationSpec::query("say", "", ParamSchema::empty())]
            }
        }
        impl AgentComponent for Voice {
            fn on_heartbeat(&mut self, _: &HeartbeatContext<'_>) -> Result<(), ComponentError> {
                Ok(())
            }
        }
        let config = AgentConfig::new(
            "a",
            FnPolicy::new("nap", |_: &State, _: &ActionSet| Decision::idle(1.0)),
            tally_env(),
        )
        .with_component("tally", Voice);
        let agent = Agent::new(config).unwrap();
        let ids: Vec<String> = agent
            .available_actions()
            .ids()
            .map(ToString::to_string)
            .collect();
        assert_eq!(ids, ["agent/tally.say", "environment/tally.add"]);
    }

    #[test]
    fn bad_config_fails_at_construction() {
        let config = AgentConfig::new(
            "",
            FnPolicy::new("nap", |_: &State, _: &ActionSet| Decision::idle(1.0)),
            tally_env(),
        );
        assert_eq!(Agent::new(config).unwrap_err(), ConfigError::EmptyAgentName);
    }
}
