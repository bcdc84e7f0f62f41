//! Per-tick and per-agent counters.
//!
//! [`TickMetrics`] captures timing for a single environment tick;
//! [`AgentMetrics`] accumulates over an agent's lifetime.

use dyad_core::ComponentId;

/// Timing collected during a single environment tick.
///
/// All durations are in microseconds.
#[derive(Clone, Debug, Default)]
pub struct TickMetrics {
    /// Wall-clock time for the entire tick.
    pub total_us: u64,
    /// Per-component `on_tick` times, in tick order.
    pub component_us: Vec<(ComponentId, u64)>,
    /// Time spent merging component states into the aggregate view.
    pub merge_us: u64,
    /// Number of components whose `on_tick` failed this tick.
    pub failures: u32,
}

/// Cumulative counters for one agent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AgentMetrics {
    /// Steps executed, excluding steps refused by the stop signal.
    pub steps: u64,
    /// Completed cycles (returns to `OBSERVING`).
    pub cycles: u64,
    /// Actions that returned a value.
    pub actions_ok: u64,
    /// Actions that failed to resolve, validate, or run.
    pub actions_failed: u64,
    /// Idle directives received.
    pub idles: u64,
    /// Isolated `on_heartbeat` failures.
    pub heartbeat_failures: u64,
    /// Observations that could not be taken.
    pub observe_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_metrics_are_zero() {
        let m = TickMetrics::default();
        assert_eq!(m.total_us, 0);
        assert!(m.component_us.is_empty());
        assert_eq!(m.merge_us, 0);
        assert_eq!(m.failures, 0);
        assert_eq!(AgentMetrics::default().cycles, 0);
    }
}
