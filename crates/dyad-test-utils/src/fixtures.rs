//! Reusable component fixtures.
//!
//! - [`Counter`]: an integer with `increment(by: int)` and `read()`.
//! - [`FailingComponent`]: ticks successfully N times, then fails.
//! - [`PendingComponent`]: accepts work immediately and completes it on a
//!   later tick instead of blocking.
//! - [`HeartbeatProbe`]: an agent component that records what it sees.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use dyad_core::{
    Args, ComponentError, OperationSpec, ParamSchema, ParamSpec, ParamType, State, Value,
};
use dyad_plugin::{AgentComponent, Component, EnvironmentComponent, HeartbeatContext, TickContext};

fn unsupported(operation: &str) -> ComponentError {
    ComponentError::UnsupportedOperation {
        operation: operation.to_string(),
    }
}

// ── Counter ────────────────────────────────────────────────────────

/// An integer counter exposing `increment(by: int)` (stateful) and
/// `read()` (query). Its state slice is `{ <key>: count }`.
///
/// Ticks leave it unchanged, so any change in `count` comes from actions.
pub struct Counter {
    pub key: String,
    pub count: i64,
}

impl Counter {
    /// A counter at zero under the key `count`.
    pub fn new() -> Self {
        Self::with_key("count")
    }

    /// A counter at zero under `key`.
    pub fn with_key(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            count: 0,
        }
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for Counter {
    fn state(&self) -> State {
        [(self.key.clone(), self.count)].into_iter().collect()
    }

    fn operations(&self) -> Vec<OperationSpec> {
        vec![
            OperationSpec::stateful(
                "increment",
                "Add `by` to the counter and return the new count.",
                ParamSchema::new([ParamSpec::required("by", ParamType::Integer)]),
            ),
            OperationSpec::query("read", "Return the current count.", ParamSchema::empty()),
        ]
    }

    fn perform(&mut self, operation: &str, args: &Args) -> Result<Value, ComponentError> {
        match operation {
            "increment" => {
                let by = args
                    .get("by")
                    .and_then(Value::as_i64)
                    .ok_or_else(|| ComponentError::failed("`by` must be an integer"))?;
                self.count = self
                    .count
                    .checked_add(by)
                    .ok_or_else(|| ComponentError::failed("counter overflow"))?;
                Ok(Value::from(self.count))
            }
            other => Err(unsupported(other)),
        }
    }

    fn query(&self, operation: &str, _args: &Args) -> Result<Value, ComponentError> {
        match operation {
            "read" => Ok(Value::from(self.count)),
            other => Err(unsupported(other)),
        }
    }
}

impl EnvironmentComponent for Counter {
    fn on_tick(&mut self, _ctx: &TickContext) -> Result<(), ComponentError> {
        Ok(())
    }
}

// ── FailingComponent ───────────────────────────────────────────────

/// Succeeds `succeed_count` ticks, then fails every tick after.
///
/// Its state slice is `{ <key>: successful_ticks }`. The call counter is
/// shared so tests can read it after the component is moved into an
/// environment.
pub struct FailingComponent {
    pub key: String,
    pub succeed_count: usize,
    successes: usize,
    call_count: Arc<AtomicUsize>,
}

impl FailingComponent {
    /// A component that ticks `succeed_count` times then fails.
    pub fn new(key: impl Into<String>, succeed_count: usize) -> Self {
        Self {
            key: key.into(),
            succeed_count,
            successes: 0,
            call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared handle to the number of `on_tick` calls.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.call_count)
    }
}

impl Component for FailingComponent {
    fn state(&self) -> State {
        [(self.key.clone(), self.successes as u64)].into_iter().collect()
    }
}

impl EnvironmentComponent for FailingComponent {
    fn on_tick(&mut self, _ctx: &TickContext) -> Result<(), ComponentError> {
        let n = self.call_count.fetch_add(1, Ordering::Relaxed);
        if n >= self.succeed_count {
            return Err(ComponentError::failed(format!(
                "deliberate failure after {} successful ticks",
                self.succeed_count
            )));
        }
        self.successes += 1;
        Ok(())
    }
}

// ── PendingComponent ───────────────────────────────────────────────

/// Work that takes `latency` ticks to complete.
///
/// `request()` never waits: it marks the job pending and returns at once.
/// Each tick counts the job down; when it reaches zero the job completes.
/// State slice: `{ "job/pending": bool, "job/completed": u64 }`.
pub struct PendingComponent {
    pub latency: u64,
    remaining: Option<u64>,
    completed: u64,
}

impl PendingComponent {
    pub fn new(latency: u64) -> Self {
        Self {
            latency,
            remaining: None,
            completed: 0,
        }
    }
}

impl Component for PendingComponent {
    fn state(&self) -> State {
        let mut state = State::new();
        state.set("job/pending", self.remaining.is_some());
        state.set("job/completed", self.completed);
        state
    }

    fn operations(&self) -> Vec<OperationSpec> {
        vec![OperationSpec::stateful(
            "request",
            "Start a job. Fails if one is already pending.",
            ParamSchema::empty(),
        )]
    }

    fn perform(&mut self, operation: &str, _args: &Args) -> Result<Value, ComponentError> {
        match operation {
            "request" if self.remaining.is_some() => {
                Err(ComponentError::failed("a job is already pending"))
            }
            "request" => {
                self.remaining = Some(self.latency);
                Ok(Value::from("pending"))
            }
            other => Err(unsupported(other)),
        }
    }
}

impl EnvironmentComponent for PendingComponent {
    fn on_tick(&mut self, _ctx: &TickContext) -> Result<(), ComponentError> {
        if let Some(remaining) = self.remaining {
            if remaining <= 1 {
                self.remaining = None;
                self.completed += 1;
            } else {
                self.remaining = Some(remaining - 1);
            }
        }
        Ok(())
    }
}

// ── HeartbeatProbe ─────────────────────────────────────────────────

/// What a [`HeartbeatProbe`] saw on one heartbeat.
#[derive(Clone, Debug, PartialEq)]
pub struct Beat {
    pub beat: u64,
    pub dt: f64,
    pub phase: Option<Value>,
}

/// Agent component that records every heartbeat it receives.
///
/// State slice: `{ "beats": count, "elapsed": total dt }`. The `beats`
/// query exercises agent-owned actions.
pub struct HeartbeatProbe {
    beats: u64,
    elapsed: f64,
    log: Arc<Mutex<Vec<Beat>>>,
}

impl HeartbeatProbe {
    pub fn new() -> Self {
        Self {
            beats: 0,
            elapsed: 0.0,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shared handle to the recorded heartbeats.
    pub fn log(&self) -> Arc<Mutex<Vec<Beat>>> {
        Arc::clone(&self.log)
    }
}

impl Default for HeartbeatProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for HeartbeatProbe {
    fn state(&self) -> State {
        let mut state = State::new();
        state.set("beats", self.beats);
        state.set("elapsed", self.elapsed);
        state
    }

    fn operations(&self) -> Vec<OperationSpec> {
        vec![OperationSpec::query(
            "beats",
            "Return the number of heartbeats received.",
            ParamSchema::empty(),
        )]
    }

    fn query(&self, operation: &str, _args: &Args) -> Result<Value, ComponentError> {
        match operation {
            "beats" => Ok(Value::from(self.beats)),
            other => Err(unsupported(other)),
        }
    }
}

impl AgentComponent for HeartbeatProbe {
    fn on_heartbeat(&mut self, ctx: &HeartbeatContext<'_>) -> Result<(), ComponentError> {
        self.beats += 1;
        self.elapsed += ctx.dt;
        self.log
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(Beat {
                beat: ctx.beat.0,
                dt: ctx.dt,
                phase: ctx.agent_state.get("agent/phase").cloned(),
            });
        Ok(())
    }
}
