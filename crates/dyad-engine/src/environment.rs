//! The shared [`Environment`]: ordered components advanced by ticks.
//!
//! An environment is shared between its tick driver and any number of
//! agents through `Arc<Environment>`. Ticks take the registry's write
//! lock for the whole fanout and merge; [`observe()`](Environment::observe)
//! takes the read lock, so an observation never interleaves with a tick
//! mid-merge. The action catalog is refreshed whenever membership changes
//! and is read without touching the registry lock.
//!
//! Actions do not go through the registry lock at all: they reach their
//! component through its cell, which serializes calls per component.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, ThreadId};
use std::time::Instant;

use dyad_core::{ActionSet, ComponentError, ComponentId, Domain, MergeError, State, TickId};
use dyad_plugin::{
    validate_component_id, ComponentRegistry, EnvironmentComponent, RegistryError, TickContext,
};
use tracing::{debug, info, warn};

use crate::config::{validate_period, ConfigError, EnvironmentConfig};
use crate::metrics::TickMetrics;

// ── Errors ─────────────────────────────────────────────────────────

/// Errors from advancing or observing an environment.
#[derive(Clone, Debug, PartialEq)]
pub enum EnvironmentError {
    /// The tick period is NaN, infinite, zero, or negative.
    InvalidPeriod {
        /// The rejected period.
        value: f64,
    },
    /// Two components define the same key with differing values.
    StateConflict(MergeError),
    /// Called from a component's `on_tick` on the ticking thread, where no
    /// whole-tick view exists and a nested tick cannot start.
    InTick,
}

impl EnvironmentError {
    /// Stable machine-readable name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidPeriod { .. } => "invalid_period",
            Self::StateConflict(_) => "key_conflict",
            Self::InTick => "in_tick",
        }
    }
}

impl fmt::Display for EnvironmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPeriod { value } => {
                write!(f, "tick period must be finite and positive, got {value}")
            }
            Self::StateConflict(e) => write!(f, "aggregate state: {e}"),
            Self::InTick => f.write_str("called from inside a tick in progress"),
        }
    }
}

impl std::error::Error for EnvironmentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::StateConflict(e) => Some(e),
            Self::InvalidPeriod { .. } | Self::InTick => None,
        }
    }
}

impl From<MergeError> for EnvironmentError {
    fn from(e: MergeError) -> Self {
        Self::StateConflict(e)
    }
}

/// An isolated `on_tick` failure. The tick continued past it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComponentFailure {
    /// The component that failed.
    pub component: ComponentId,
    /// What it reported.
    pub error: ComponentError,
}

/// Error returned by [`Environment::tick`].
#[derive(Clone, Debug, PartialEq)]
pub struct TickError {
    /// The underlying error.
    pub kind: EnvironmentError,
    /// Component failures collected before the error.
    pub failures: Vec<ComponentFailure>,
}

impl fmt::Display for TickError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for TickError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

// ── Reports ────────────────────────────────────────────────────────

/// Result of a successful [`Environment::tick`].
#[derive(Clone, Debug)]
pub struct TickReport {
    /// The tick that ran.
    pub tick: TickId,
    /// Aggregate state after the tick.
    pub state: State,
    /// Components whose `on_tick` failed; their state is whatever they
    /// left behind.
    pub failures: Vec<ComponentFailure>,
    /// Timing for this tick.
    pub metrics: TickMetrics,
}

/// The aggregate state together with the tick it was taken after.
#[derive(Clone, Debug, PartialEq)]
pub struct Observation {
    /// Last completed tick (`TickId(0)` before the first).
    pub tick: TickId,
    /// The aggregate view.
    pub state: State,
}

/// How [`Environment::register`] was carried out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Registration {
    /// The component joined the tick order; its actions are available.
    Added,
    /// A tick was in flight. The component joins when that tick finishes.
    Deferred,
}

/// How [`Environment::deregister`] was carried out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Deregistration {
    /// The component was removed; its actions fail with `OwnerUnavailable`.
    Removed,
    /// A tick was in flight. Removal happens when that tick finishes.
    Deferred,
}

// ── Environment ────────────────────────────────────────────────────

type Registry = ComponentRegistry<dyn EnvironmentComponent>;

enum Change {
    Add(ComponentId, Box<dyn EnvironmentComponent>),
    Remove(ComponentId),
}

/// Membership changes requested while a tick holds the registry.
///
/// `ticking` is only written by the thread holding the write guard, so it
/// is `Some` exactly while a fanout is running.
#[derive(Default)]
struct Pending {
    ticking: Option<ThreadId>,
    changes: Vec<Change>,
}

/// What `get_actions` and `component_ids` serve without the registry lock.
#[derive(Default)]
struct Catalog {
    actions: ActionSet,
    ids: Vec<ComponentId>,
}

impl Catalog {
    fn of(registry: &Registry) -> Self {
        Self {
            actions: registry.actions(),
            ids: registry.ids().cloned().collect(),
        }
    }
}

/// A set of environment components advanced together by `tick`.
///
/// Components may add or remove components, or query the catalog, from
/// inside their own `on_tick`: membership changes are queued and applied
/// in request order before the tick returns.
///
/// # Examples
///
/// ```
/// use dyad_core::{ComponentError, State, TickId, Value};
/// use dyad_engine::{Environment, EnvironmentConfig};
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
///
/// let env = Environment::new(
///     EnvironmentConfig::default().with_component("clock", Clock { elapsed: 0.0 }),
/// ).unwrap();
/// let report = env.tick(0.5).unwrap();
/// assert_eq!(report.tick, TickId(1));
/// assert_eq!(env.observe().unwrap().get("elapsed"), Some(&Value::from(0.5)));
/// ```
pub struct Environment {
    registry: RwLock<Registry>,
    /// Last completed tick. Written only under the registry write lock.
    tick: AtomicU64,
    pending: Mutex<Pending>,
    catalog: Mutex<Catalog>,
    last_metrics: Mutex<TickMetrics>,
    period: f64,
}

// Compile-time assertion: environments are shared across agent threads.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<Environment>();
};

impl Environment {
    /// Build an environment, registering the configured components in order.
    pub fn new(config: EnvironmentConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut registry = ComponentRegistry::new(Domain::Environment);
        for (id, component) in config.components {
            registry.register(id, component)?;
        }
        Ok(Self {
            catalog: Mutex::new(Catalog::of(&registry)),
            registry: RwLock::new(registry),
            tick: AtomicU64::new(0),
            pending: Mutex::new(Pending::default()),
            last_metrics: Mutex::new(TickMetrics::default()),
            period: config.period,
        })
    }

    /// The configured default period.
    pub fn period(&self) -> f64 {
        self.period
    }

    /// Last completed tick (`TickId(0)` before the first).
    pub fn tick_id(&self) -> TickId {
        TickId(self.tick.load(Ordering::Acquire))
    }

    /// Metrics from the most recent tick.
    pub fn last_metrics(&self) -> TickMetrics {
        lock(&self.last_metrics).clone()
    }

    /// Advance every component by one step of `period`, in registration
    /// order, then rebuild the aggregate view.
    ///
    /// A failing `on_tick` is logged and recorded in the report; the
    /// remaining components still run. Registrations and deregistrations
    /// requested while the tick is in flight are applied before it returns.
    /// Concurrent calls run one after another.
    ///
    /// # Errors
    ///
    /// [`EnvironmentError::InvalidPeriod`] before anything runs,
    /// [`EnvironmentError::InTick`] when called from a component's own
    /// `on_tick`, or [`EnvironmentError::StateConflict`] if component states
    /// collide after the fanout. Component failures collected so far are
    /// carried in [`TickError::failures`].
    pub fn tick(&self, period: f64) -> Result<TickReport, TickError> {
        if validate_period(period).is_err() {
            return Err(TickError {
                kind: EnvironmentError::InvalidPeriod { value: period },
                failures: Vec::new(),
            });
        }
        if self.in_own_tick() {
            return Err(TickError {
                kind: EnvironmentError::InTick,
                failures: Vec::new(),
            });
        }
        let mut registry = self.write();
        lock(&self.pending).ticking = Some(thread::current().id());
        let tick_start = Instant::now();
        let tick = TickId(self.tick.load(Ordering::Acquire) + 1);
        let ctx = TickContext { tick, dt: period };

        let mut failures = Vec::new();
        let mut component_us = Vec::with_capacity(registry.len());
        for cell in registry.iter() {
            let start = Instant::now();
            if let Err(error) = cell.with_mut(|c| c.on_tick(&ctx)) {
                warn!(%tick, component = %cell.id(), %error, "on_tick failed");
                failures.push(ComponentFailure {
                    component: cell.id().clone(),
                    error,
                });
            }
            component_us.push((cell.id().clone(), start.elapsed().as_micros() as u64));
        }

        let merge_start = Instant::now();
        let merged = registry.merged_state();
        let merge_us = merge_start.elapsed().as_micros() as u64;

        self.tick.store(tick.0, Ordering::Release);
        self.apply_pending(&mut registry);
        drop(registry);

        let metrics = TickMetrics {
            total_us: tick_start.elapsed().as_micros() as u64,
            component_us,
            merge_us,
            failures: failures.len() as u32,
        };
        *lock(&self.last_metrics) = metrics.clone();

        match merged {
            Ok(state) => {
                debug!(%tick, keys = state.len(), failures = failures.len(), "tick complete");
                Ok(TickReport {
                    tick,
                    state,
                    failures,
                    metrics,
                })
            }
            Err(e) => {
                warn!(%tick, error = %e, "aggregate state conflict");
                Err(TickError {
                    kind: e.into(),
                    failures,
                })
            }
        }
    }

    /// [`tick`](Self::tick) with the configured default period.
    pub fn advance(&self) -> Result<TickReport, TickError> {
        self.tick(self.period)
    }

    /// The current aggregate view, without advancing.
    ///
    /// # Errors
    ///
    /// [`EnvironmentError::StateConflict`] if component states collide, or
    /// [`EnvironmentError::InTick`] from inside a component's `on_tick`,
    /// where no whole-tick view exists yet.
    pub fn observe(&self) -> Result<State, EnvironmentError> {
        Ok(self.observation()?.state)
    }

    /// Like [`observe`](Self::observe), paired with the tick it reflects.
    pub fn observation(&self) -> Result<Observation, EnvironmentError> {
        if self.in_own_tick() {
            return Err(EnvironmentError::InTick);
        }
        let registry = self.read();
        Ok(Observation {
            tick: self.tick_id(),
            state: registry.merged_state()?,
        })
    }

    /// Union of every live component's actions, in registration order.
    pub fn get_actions(&self) -> ActionSet {
        lock(&self.catalog).actions.clone()
    }

    /// Ids of live components in tick order.
    pub fn component_ids(&self) -> Vec<ComponentId> {
        lock(&self.catalog).ids.clone()
    }

    /// Append a component to the tick order.
    ///
    /// If a tick is in flight the component joins when it finishes; a
    /// duplicate id or malformed operation is then only reported in the log.
    pub fn register(
        &self,
        id: impl Into<ComponentId>,
        component: impl EnvironmentComponent,
    ) -> Result<Registration, ConfigError> {
        let id = id.into();
        validate_component_id(&id)?;
        let component: Box<dyn EnvironmentComponent> = Box::new(component);
        let Some(component) = self.defer(component, |c| Change::Add(id.clone(), c)) else {
            debug!(component = %id, "registration deferred to end of tick");
            return Ok(Registration::Deferred);
        };
        let mut registry = self.write();
        registry.register(id.clone(), component)?;
        self.refresh(&registry);
        info!(component = %id, "environment component registered");
        Ok(Registration::Added)
    }

    /// Remove a component. Its actions fail with `OwnerUnavailable` from
    /// the moment it is removed.
    ///
    /// If a tick is in flight the component keeps participating in it and
    /// is removed when it finishes; an unknown id is then only reported in
    /// the log.
    pub fn deregister(&self, id: &ComponentId) -> Result<Deregistration, ConfigError> {
        if self.defer(id.clone(), Change::Remove).is_none() {
            debug!(component = %id, "deregistration deferred to end of tick");
            return Ok(Deregistration::Deferred);
        }
        let mut registry = self.write();
        registry.deregister(id)?;
        self.refresh(&registry);
        info!(component = %id, "environment component deregistered");
        Ok(Deregistration::Removed)
    }

    /// Queue a change if a tick is in flight, otherwise hand the payload
    /// back for immediate application.
    fn defer<T>(&self, payload: T, change: impl FnOnce(T) -> Change) -> Option<T> {
        let mut pending = lock(&self.pending);
        if pending.ticking.is_some() {
            pending.changes.push(change(payload));
            None
        } else {
            Some(payload)
        }
    }

    fn in_own_tick(&self) -> bool {
        lock(&self.pending).ticking == Some(thread::current().id())
    }

    /// Apply queued changes in request order, including any requested while
    /// applying, then end the tick. Called with the write guard held.
    fn apply_pending(&self, registry: &mut Registry) {
        loop {
            let changes = {
                let mut pending = lock(&self.pending);
                if pending.changes.is_empty() {
                    pending.ticking = None;
                    break;
                }
                std::mem::take(&mut pending.changes)
            };
            for change in changes {
                match change {
                    Change::Add(id, component) => match registry.register(id.clone(), component) {
                        Ok(_) => info!(component = %id, "environment component registered"),
                        Err(e) => warn!(component = %id, error = %e, "deferred registration failed"),
                    },
                    Change::Remove(id) => match registry.deregister(&id) {
                        Ok(_) => info!(component = %id, "environment component deregistered"),
                        Err(RegistryError::UnknownComponent { .. }) => {
                            warn!(component = %id, "deferred deregistration of unknown component")
                        }
                        Err(e) => {
                            warn!(component = %id, error = %e, "deferred deregistration failed")
                        }
                    },
                }
            }
        }
        self.refresh(registry);
    }

    fn refresh(&self, registry: &Registry) {
        *lock(&self.catalog) = Catalog::of(registry);
    }

    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("components", &self.component_ids())
            .field("tick", &self.tick_id())
            .field("period", &self.period)
            .finish()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
