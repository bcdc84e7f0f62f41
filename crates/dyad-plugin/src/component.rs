//! The [`Component`] capability traits.
//!
//! Components are the units of domain logic plugged into an environment or
//! an agent. Each owns a private [`State`] slice, declares the operations it
//! exposes, and reacts to its owner's clock.

use dyad_core::{Args, BeatId, ComponentError, OperationSpec, State, TickId, Value};

/// Capabilities shared by environment and agent components.
///
/// # Contract
///
/// - [`state()`](Self::state) returns a snapshot of the component's own
///   slice and never mutates it.
/// - [`operations()`](Self::operations) is called once at registration;
///   the returned set is fixed for the component's lifetime.
/// - [`perform()`](Self::perform) runs operations declared `stateful` and
///   may mutate only `self`. [`query()`](Self::query) runs read-only
///   operations through `&self`, so the borrow checker enforces that they
///   cannot mutate.
/// - Neither blocks indefinitely. Work that has to wait is recorded as
///   pending in the component's own state and completed on a later step.
///
/// Calls into one component are serialized by the runtime; implementations
/// do not need interior locking.
pub trait Component: Send + 'static {
    /// Snapshot of this component's state slice.
    fn state(&self) -> State;

    /// Operations this component exposes, in declaration order.
    ///
    /// Default: none.
    fn operations(&self) -> Vec<OperationSpec> {
        Vec::new()
    }

    /// Run a stateful operation. `args` already match the declared schema.
    ///
    /// Default: [`ComponentError::UnsupportedOperation`].
    fn perform(&mut self, operation: &str, args: &Args) -> Result<Value, ComponentError> {
        let _ = args;
        Err(ComponentError::UnsupportedOperation {
            operation: operation.to_string(),
        })
    }

    /// Run a read-only operation. `args` already match the declared schema.
    ///
    /// Default: [`ComponentError::UnsupportedOperation`].
    fn query(&self, operation: &str, args: &Args) -> Result<Value, ComponentError> {
        let _ = args;
        Err(ComponentError::UnsupportedOperation {
            operation: operation.to_string(),
        })
    }
}

/// Clock input for one environment tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TickContext {
    /// The tick being executed (the first tick is `TickId(1)`).
    pub tick: TickId,
    /// Logical duration of this step.
    pub dt: f64,
}

/// Clock input for one agent heartbeat.
#[derive(Clone, Copy, Debug)]
pub struct HeartbeatContext<'a> {
    /// The heartbeat being delivered.
    pub beat: BeatId,
    /// Logical duration of this step.
    pub dt: f64,
    /// Read-only view of the owning agent's state.
    pub agent_state: &'a State,
}

/// A component owned by an environment and advanced by ticks.
///
/// # Examples
///
/// ```
/// use dyad_core::{ComponentError, State};
/// use dyad_plugin::{Component, EnvironmentComponent, TickContext};
///
/// struct Clock { elapsed: f64 }
///
/// impl Component for Clock {
///     fn state(&self) -> State {
///         [("elapsed", self.elapsed)].into_iter().collect()
///     }
/// }
///
/// impl EnvironmentComponent for Clock {
///     fn on_tick(&mut self, ctx: &TickContext) -> Result<(), ComponentError> {
///         self.elapsed += ctx.dt;
///         Ok(())
///     }
/// }
/// ```
pub trait EnvironmentComponent: Component {
    /// Advance by exactly one step of `ctx.dt`.
    fn on_tick(&mut self, ctx: &TickContext) -> Result<(), ComponentError>;
}

/// A component owned by an agent and advanced by heartbeats.
pub trait AgentComponent: Component {
    /// Advance by exactly one heartbeat of `ctx.dt`.
    fn on_heartbeat(&mut self, ctx: &HeartbeatContext<'_>) -> Result<(), ComponentError>;
}
