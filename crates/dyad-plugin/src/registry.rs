//! Ordered component registry and registration-time validation.
//!
//! [`ComponentRegistry`] keeps components in registration order (which is
//! also tick/heartbeat order), rejects malformed registrations up front, and
//! answers the aggregate queries owners need: the union of bound actions and
//! the merged state of every live component.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use dyad_core::{ActionSet, ComponentId, Domain, MergeError, OnConflict, OperationSpec, Owner, State};
use indexmap::IndexMap;
use tracing::debug;

use crate::cell::ComponentCell;
use crate::component::Component;

// ── Errors ─────────────────────────────────────────────────────────

/// Errors from registering or deregistering components.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// A component with this id is already registered.
    DuplicateComponent {
        /// The contested id.
        id: ComponentId,
    },
    /// No live component has this id.
    UnknownComponent {
        /// The missing id.
        id: ComponentId,
    },
    /// The id is empty or contains a reserved separator (`/` or `.`).
    InvalidComponentId {
        /// The rejected id.
        id: ComponentId,
    },
    /// A component declared a malformed operation.
    InvalidOperation {
        /// The declaring component.
        owner: Owner,
        /// The operation name as declared.
        operation: String,
        /// What is wrong with it.
        reason: String,
    },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateComponent { id } => write!(f, "component '{id}' is already registered"),
            Self::UnknownComponent { id } => write!(f, "no component registered as '{id}'"),
            Self::InvalidComponentId { id } => write!(
                f,
                "component id '{id}' must be non-empty and contain no '/' or '.'"
            ),
            Self::InvalidOperation {
                owner,
                operation,
                reason,
            } => write!(f, "operation '{operation}' of '{owner}': {reason}"),
        }
    }
}

impl Error for RegistryError {}

// ── Validation ─────────────────────────────────────────────────────

/// Check that a component id can serve as an action and state namespace.
pub fn validate_component_id(id: &ComponentId) -> Result<(), RegistryError> {
    let s = id.as_str();
    if s.is_empty() || s.contains('/') || s.contains('.') {
        return Err(RegistryError::InvalidComponentId { id: id.clone() });
    }
    Ok(())
}

/// Check a component's declared operations.
///
/// Operation names must be non-empty and unique within the component, and
/// each parameter schema must not declare a name twice.
pub fn validate_operations(owner: &Owner, specs: &[OperationSpec]) -> Result<(), RegistryError> {
    for (i, spec) in specs.iter().enumerate() {
        let invalid = |reason: String| RegistryError::InvalidOperation {
            owner: owner.clone(),
            operation: spec.name.clone(),
            reason,
        };
        if spec.name.is_empty() {
            return Err(invalid("operation name is empty".into()));
        }
        if specs[..i].iter().any(|s| s.name == spec.name) {
            return Err(invalid("declared more than once".into()));
        }
        let dups = spec.params.duplicate_names();
        if !dups.is_empty() {
            return Err(invalid(format!(
                "duplicate parameter names: {}",
                dups.join(", ")
            )));
        }
    }
    Ok(())
}

// ── ComponentRegistry ──────────────────────────────────────────────

/// Components of one owner, in registration order.
pub struct ComponentRegistry<C: ?Sized> {
    domain: Domain,
    cells: IndexMap<ComponentId, Arc<ComponentCell<C>>>,
}

impl<C: Component + ?Sized> ComponentRegistry<C> {
    /// An empty registry for components of `domain`.
    pub fn new(domain: Domain) -> Self {
        Self {
            domain,
            cells: IndexMap::new(),
        }
    }

    /// The domain every registered component belongs to.
    pub fn domain(&self) -> Domain {
        self.domain
    }

    /// Register `component` under `id`, appending it to the order.
    ///
    /// # Errors
    ///
    /// Fails if the id is malformed or already taken (including by a
    /// retired component not yet swept), or if the component's declared
    /// operations are malformed.
    pub fn register(
        &mut self,
        id: ComponentId,
        component: Box<C>,
    ) -> Result<Arc<ComponentCell<C>>, RegistryError> {
        validate_component_id(&id)?;
        if self.cells.contains_key(&id) {
            return Err(RegistryError::DuplicateComponent { id });
        }
        let owner = Owner {
            domain: self.domain,
            component: id.clone(),
        };
        let cell = ComponentCell::new(owner, component)?;
        debug!(
            owner = %cell.owner(),
            actions = cell.actions().len(),
            "component registered"
        );
        self.cells.insert(id, Arc::clone(&cell));
        Ok(cell)
    }

    /// Mark a live component as deregistered without removing it.
    ///
    /// The component stops contributing state and actions immediately; it is
    /// physically removed by the next [`sweep`](Self::sweep).
    pub fn retire(&self, id: &ComponentId) -> Result<Arc<ComponentCell<C>>, RegistryError> {
        match self.cells.get(id) {
            Some(cell) if cell.retire() => Ok(Arc::clone(cell)),
            _ => Err(RegistryError::UnknownComponent { id: id.clone() }),
        }
    }

    /// Remove every retired component, preserving the order of the rest.
    /// Returns the removed ids.
    pub fn sweep(&mut self) -> Vec<ComponentId> {
        let mut removed = Vec::new();
        self.cells.retain(|id, cell| {
            if cell.is_retired() {
                debug!(owner = %cell.owner(), "component removed");
                removed.push(id.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    /// Retire and remove a component immediately.
    pub fn deregister(&mut self, id: &ComponentId) -> Result<Arc<ComponentCell<C>>, RegistryError> {
        let cell = self.retire(id)?;
        self.cells.shift_remove(id);
        Ok(cell)
    }

    /// Look up a live component.
    pub fn get(&self, id: &ComponentId) -> Option<&Arc<ComponentCell<C>>> {
        self.cells.get(id).filter(|cell| !cell.is_retired())
    }

    /// Live components in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ComponentCell<C>>> {
        self.cells.values().filter(|cell| !cell.is_retired())
    }

    /// Ids of live components in registration order.
    pub fn ids(&self) -> impl Iterator<Item = &ComponentId> {
        self.iter().map(|cell| cell.id())
    }

    /// Number of live components.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Whether there are no live components.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Union of every live component's actions, namespaced by owner.
    pub fn actions(&self) -> ActionSet {
        let mut set = ActionSet::new();
        for cell in self.iter() {
            set.extend(cell.actions().iter().cloned());
        }
        set
    }

    /// Merge every live component's state with [`OnConflict::Error`].
    ///
    /// Components are expected to use disjoint keys; a collision is a
    /// configuration error reported as [`MergeError::KeyConflict`].
    pub fn merged_state(&self) -> Result<State, MergeError> {
        let mut merged = State::new();
        for cell in self.iter() {
            merged.absorb(&cell.state(), "", OnConflict::Error)?;
        }
        Ok(merged)
    }
}

impl<C: ?Sized> fmt::Debug for ComponentRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("domain", &self.domain)
            .field("components", &self.cells.keys().collect::<Vec<_>>())
            .finish()
    }
}
