//! Threaded clock drivers.
//!
//! [`EnvironmentDriver`] runs [`Environment::advance`] on a dedicated
//! thread at a fixed wall-clock rate and publishes each outcome on a
//! bounded channel. [`AgentDriver`] runs [`Agent::step`] on its own thread
//! and hands the agent back on shutdown. The two clocks are independent:
//! nothing here synchronizes ticks with heartbeats.
//!
//! ```text
//! Tick Thread                 Agent Thread(s)           User Thread
//!     |                            |                        |
//!     | env.advance()              | agent.step()           |
//!     |   write lock, fanout       |   env.observation()    |
//!     |   merge, deferred removals |   policy.decide()      |
//!     | report_tx.try_send() ------------------------------>| reports()
//!     | sleep(budget - elapsed)    | sleep(budget - elapsed)|
//!     |                            |                        |
//!     |<---------------------------|-- shutdown() ----------|
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::{info, warn};

use crate::agent::{Agent, StepOutcome, StopHandle};
use crate::config::{ClockConfig, ConfigError};
use crate::environment::{Environment, TickError, TickReport};

/// Outcome of one driven tick.
pub type TickOutcome = Result<TickReport, TickError>;

// ── ShutdownReport ─────────────────────────────────────────────────

/// Report from [`EnvironmentDriver::shutdown`].
#[derive(Clone, Debug, Default)]
pub struct ShutdownReport {
    /// Total time spent shutting down, in milliseconds.
    pub total_ms: u64,
    /// Ticks executed by the driver thread.
    pub ticks: u64,
    /// Reports dropped because the channel was full.
    pub dropped_reports: u64,
    /// Whether the tick thread was joined successfully.
    pub tick_joined: bool,
}

// ── EnvironmentDriver ──────────────────────────────────────────────

/// Runs an environment's tick loop on a background thread.
///
/// Shutdown takes effect between full ticks.
pub struct EnvironmentDriver {
    environment: Arc<Environment>,
    reports: Receiver<TickOutcome>,
    shutdown_flag: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
    tick_thread: Option<JoinHandle<u64>>,
}

impl EnvironmentDriver {
    /// Spawn the tick thread.
    pub fn start(environment: Arc<Environment>, config: ClockConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let (report_tx, reports) = crossbeam_channel::bounded(config.report_capacity);
        let shutdown_flag = Arc::new(AtomicBool::new(false));
        let dropped = Arc::new(AtomicU64::new(0));

        let state = TickLoop {
            environment: Arc::clone(&environment),
            report_tx,
            shutdown_flag: Arc::clone(&shutdown_flag),
            dropped: Arc::clone(&dropped),
            budget: Duration::from_secs_f64(1.0 / config.rate_hz),
        };
        let tick_thread = thread::Builder::new()
            .name("dyad-tick".into())
            .spawn(move || state.run())
            .map_err(|e| ConfigError::ThreadSpawnFailed {
                reason: format!("tick thread: {e}"),
            })?;
        info!(rate_hz = config.rate_hz, period = environment.period(), "tick driver started");

        Ok(Self {
            environment,
            reports,
            shutdown_flag,
            dropped,
            tick_thread: Some(tick_thread),
        })
    }

    /// The driven environment.
    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    /// Receiver of tick outcomes. May be cloned for several consumers.
    pub fn reports(&self) -> &Receiver<TickOutcome> {
        &self.reports
    }

    /// Whether the tick thread is still running.
    pub fn is_running(&self) -> bool {
        self.tick_thread
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop after the current tick and join the thread. Idempotent.
    pub fn shutdown(&mut self) -> ShutdownReport {
        let start = Instant::now();
        self.shutdown_flag.store(true, Ordering::Release);
        let (ticks, tick_joined) = match self.tick_thread.take() {
            Some(handle) => match handle.join() {
                Ok(ticks) => (ticks, true),
                Err(_) => {
                    warn!("tick thread panicked");
                    (0, false)
                }
            },
            None => (0, false),
        };
        let report = ShutdownReport {
            total_ms: start.elapsed().as_millis() as u64,
            ticks,
            dropped_reports: self.dropped.load(Ordering::Relaxed),
            tick_joined,
        };
        if tick_joined {
            info!(ticks, dropped = report.dropped_reports, "tick driver stopped");
        }
        report
    }
}

impl Drop for EnvironmentDriver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct TickLoop {
    environment: Arc<Environment>,
    report_tx: Sender<TickOutcome>,
    shutdown_flag: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
    budget: Duration,
}

impl TickLoop {
    fn run(self) -> u64 {
        let mut ticks = 0;
        loop {
            if self.shutdown_flag.load(Ordering::Acquire) {
                break;
            }
            let tick_start = Instant::now();

            let outcome = self.environment.advance();
            ticks += 1;
            match self.report_tx.try_send(outcome) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
                // Nobody is listening; keep ticking.
                Err(TrySendError::Disconnected(_)) => {}
            }

            if let Some(remaining) = self.budget.checked_sub(tick_start.elapsed()) {
                thread::sleep(remaining);
            }
        }
        ticks
    }
}

// ── AgentDriver ────────────────────────────────────────────────────

/// Runs an agent's step loop on a background thread.
///
/// Shutdown raises the agent's stop signal, which the agent honors at its
/// next `OBSERVING` boundary, then joins and returns the agent.
pub struct AgentDriver {
    name: String,
    stop: StopHandle,
    agent_thread: Option<JoinHandle<Agent>>,
}

impl AgentDriver {
    /// Move `agent` onto its own thread and start stepping it.
    pub fn start(agent: Agent, config: ClockConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let name = agent.name().to_string();
        let stop = agent.stop_handle();
        let budget = Duration::from_secs_f64(1.0 / config.rate_hz);
        let agent_thread = thread::Builder::new()
            .name(format!("dyad-agent-{name}"))
            .spawn(move || step_loop(agent, budget))
            .map_err(|e| ConfigError::ThreadSpawnFailed {
                reason: format!("agent thread: {e}"),
            })?;
        info!(agent = %name, rate_hz = config.rate_hz, "agent driver started");
        Ok(Self {
            name,
            stop,
            agent_thread: Some(agent_thread),
        })
    }

    /// The driven agent's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A handle that raises the agent's stop signal.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Whether the agent thread is still running.
    pub fn is_running(&self) -> bool {
        self.agent_thread
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the agent at its next `OBSERVING` boundary and take it back.
    ///
    /// The returned agent still has its stop signal raised; call
    /// `stop_handle().reset()` before stepping it again.
    ///
    /// # Errors
    ///
    /// [`ConfigError::AgentRecoveryFailed`] if the agent thread panicked.
    pub fn shutdown(mut self) -> Result<Agent, ConfigError> {
        self.stop.stop();
        let handle = self
            .agent_thread
            .take()
            .ok_or(ConfigError::AgentRecoveryFailed)?;
        let agent = handle.join().map_err(|_| ConfigError::AgentRecoveryFailed)?;
        info!(agent = %self.name, cycles = agent.metrics().cycles, "agent driver stopped");
        Ok(agent)
    }
}

impl Drop for AgentDriver {
    fn drop(&mut self) {
        if let Some(handle) = self.agent_thread.take() {
            self.stop.stop();
            if handle.join().is_err() {
                warn!(agent = %self.name, "agent thread panicked");
            }
        }
    }
}

fn step_loop(mut agent: Agent, budget: Duration) -> Agent {
    loop {
        let step_start = Instant::now();
        if agent.step().outcome == StepOutcome::Stopped {
            break;
        }
        if let Some(remaining) = budget.checked_sub(step_start.elapsed()) {
            thread::sleep(remaining);
        }
    }
    agent
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AgentConfig, EnvironmentConfig};
    use dyad_core::{ActionSet, ComponentError, Decision, State, TickId};
    use dyad_plugin::{Component, EnvironmentComponent, FnPolicy, TickContext};

    struct Ticker {
        ticks: u64,
    }

    impl Component for Ticker {
        fn state(&self) -> State {
            [("ticks", self.ticks)].into_iter().collect()
        }
    }

    impl EnvironmentComponent for Ticker {
        fn on_tick(&mut self, _ctx: &TickContext) -> Result<(), ComponentError> {
            self.ticks += 1;
            Ok(())
        }
    }

    fn fast() -> ClockConfig {
        ClockConfig {
            rate_hz: 1000.0,
            report_capacity: 4,
        }
    }

    fn ticker_env() -> Arc<Environment> {
        Arc::new(
            Environment::new(EnvironmentConfig::default().with_component("ticker", Ticker { ticks: 0 }))
                .unwrap(),
        )
    }

    #[test]
    fn tick_driver_publishes_reports_in_order() {
        let env = ticker_env();
        let mut driver = EnvironmentDriver::start(Arc::clone(&env), fast()).unwrap();
        let first = driver
            .reports()
            .recv_timeout(Duration::from_secs(5))
            .unwrap()
            .unwrap();
        assert_eq!(first.tick, TickId(1));
        let second = driver
            .reports()
            .recv_timeout(Duration::from_secs(5))
            .unwrap()
            .unwrap();
        assert!(second.tick > first.tick);

        let report = driver.shutdown();
        assert!(report.tick_joined);
        assert!(!driver.is_running());
        // Shutdown lands between full ticks.
        assert_eq!(env.tick_id().0, report.ticks);
        assert_eq!(env.observe().unwrap().get("ticks"), Some(&report.ticks.into()));
        // Idempotent.
        assert!(!driver.shutdown().tick_joined);
    }

    #[test]
    fn full_channel_drops_and_counts() {
        let env = ticker_env();
        let mut driver = EnvironmentDriver::start(env, fast()).unwrap();
        while driver.reports().len() < 4 {
            thread::sleep(Duration::from_millis(1));
        }
        thread::sleep(Duration::from_millis(20));
        let report = driver.shutdown();
        assert!(report.dropped_reports > 0);
        assert_eq!(report.ticks, report.dropped_reports + 4);
    }

    #[test]
    fn invalid_clock_config_spawns_nothing() {
        let config = ClockConfig {
            rate_hz: 0.0,
            ..ClockConfig::default()
        };
        assert!(matches!(
            EnvironmentDriver::start(ticker_env(), config),
            Err(ConfigError::InvalidTickRate { .. })
        ));
    }

    #[test]
    fn agent_driver_returns_agent_at_cycle_boundary() {
        let config = AgentConfig::new(
            "napper",
            FnPolicy::new("nap", |_: &State, _: &ActionSet| Decision::idle(1.0)),
            ticker_env(),
        );
        let agent = Agent::new(config).unwrap();
        let driver = AgentDriver::start(agent, fast()).unwrap();
        assert_eq!(driver.name(), "napper");
        thread::sleep(Duration::from_millis(20));
        let agent = driver.shutdown().unwrap();
        assert_eq!(agent.phase(), crate::agent::Phase::Observing);
        assert!(agent.metrics().cycles > 0);
        assert_eq!(agent.metrics().steps, agent.metrics().cycles * 3);
    }
}
