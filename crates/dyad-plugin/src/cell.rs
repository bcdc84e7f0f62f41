//! [`ComponentCell`]: a registered component plus its bound actions.
//!
//! The cell is the only path into a component once it is registered. It
//! owns the component behind a mutex, so clock callbacks, state snapshots,
//! and action dispatch against one component are serialized while distinct
//! components proceed in parallel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use dyad_core::{
    Action, ActionSet, ActionTarget, Args, ComponentError, ComponentId, Owner, State, Value,
};

use crate::component::{AgentComponent, Component, EnvironmentComponent};
use crate::registry::{validate_operations, RegistryError};

/// Cell holding an environment component.
pub type EnvironmentCell = ComponentCell<dyn EnvironmentComponent>;

/// Cell holding an agent component.
pub type AgentCell = ComponentCell<dyn AgentComponent>;

/// A registered component, its owner identity, and its bound actions.
pub struct ComponentCell<C: ?Sized> {
    owner: Owner,
    component: Mutex<Box<C>>,
    actions: ActionSet,
    retired: AtomicBool,
}

// Compile-time assertion: cells are shared across agent threads.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<EnvironmentCell>();
    assert::<AgentCell>();
};

impl<C: Component + ?Sized> ComponentCell<C> {
    /// Wrap `component` and bind one [`Action`] per declared operation.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if the declared operations are malformed
    /// (empty or duplicate names, duplicate parameter names).
    pub fn new(owner: Owner, component: Box<C>) -> Result<Arc<Self>, RegistryError> {
        let specs = component.operations();
        validate_operations(&owner, &specs)?;
        Ok(Arc::new_cyclic(|weak: &Weak<Self>| {
            let target: Weak<dyn ActionTarget> = weak.clone();
            let actions = specs
                .into_iter()
                .map(|spec| Action::bind(owner.clone(), spec, target.clone()))
                .collect();
            Self {
                owner,
                component: Mutex::new(component),
                actions,
                retired: AtomicBool::new(false),
            }
        }))
    }

    /// The owning domain and registration id.
    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    /// The registration id.
    pub fn id(&self) -> &ComponentId {
        &self.owner.component
    }

    /// Actions bound to this component, in declaration order.
    pub fn actions(&self) -> &ActionSet {
        &self.actions
    }

    /// Snapshot of the component's state slice.
    pub fn state(&self) -> State {
        self.lock().state()
    }

    /// Run `f` with exclusive access to the component.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut C) -> R) -> R {
        let mut guard = self.lock();
        f(&mut **guard)
    }

    /// Mark the component as deregistered. Bound actions fail with
    /// `OwnerUnavailable` from now on. Idempotent; returns whether this call
    /// changed the flag.
    pub fn retire(&self) -> bool {
        !self.retired.swap(true, Ordering::AcqRel)
    }

    /// Whether the component has been deregistered.
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    fn lock(&self) -> MutexGuard<'_, Box<C>> {
        // A panicking component leaves no runtime bookkeeping half-written.
        self.component.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C: Component + ?Sized> ActionTarget for ComponentCell<C> {
    fn is_retired(&self) -> bool {
        ComponentCell::is_retired(self)
    }

    fn dispatch(
        &self,
        operation: &str,
        stateful: bool,
        args: &Args,
    ) -> Result<Value, ComponentError> {
        let mut guard = self.lock();
        if stateful {
            guard.perform(operation, args)
        } else {
            guard.query(operation, args)
        }
    }
}

impl<C: ?Sized> std::fmt::Debug for ComponentCell<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentCell")
            .field("owner", &self.owner)
            .field("actions", &self.actions.len())
            .field("retired", &self.retired.load(Ordering::Relaxed))
            .finish()
    }
}
