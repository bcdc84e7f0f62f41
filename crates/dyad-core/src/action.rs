//! Actions, action sets, and policy directives.
//!
//! An [`Action`] is a value binding of `(owner, operation, schema)`. It does
//! not capture the owner's state; it holds a weak reference to an
//! [`ActionTarget`] and dispatches through it, so the owner's lifetime and
//! locking stay explicit. Once the owner is deregistered every action bound
//! to it reports [`ActionError::OwnerUnavailable`].

use std::fmt;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{ActionError, ComponentError};
use crate::id::{ActionId, Owner};
use crate::schema::{Args, ParamSchema};
use crate::Value;

/// Declaration of one operation a component exposes.
///
/// Returned by a component at registration; the runtime turns each spec
/// into an [`Action`] bound to that component.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSpec {
    /// Operation name, unique within the component.
    pub name: String,
    /// What the operation does, for policies that reason over text.
    pub description: String,
    /// Declared parameters.
    pub params: ParamSchema,
    /// Whether invoking the operation may mutate the owner's state.
    pub stateful: bool,
}

impl OperationSpec {
    /// A state-mutating operation.
    pub fn stateful(
        name: impl Into<String>,
        description: impl Into<String>,
        params: ParamSchema,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params,
            stateful: true,
        }
    }

    /// A read-only operation.
    pub fn query(
        name: impl Into<String>,
        description: impl Into<String>,
        params: ParamSchema,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params,
            stateful: false,
        }
    }
}

/// The owner side of an action binding.
///
/// Implemented by the runtime's component cell, which serializes calls
/// against one component. `dispatch` receives arguments that already passed
/// schema validation.
pub trait ActionTarget: Send + Sync {
    /// Whether the owner has been deregistered. Checked before dispatch so
    /// that removal takes effect immediately even while the owner is still
    /// referenced elsewhere.
    fn is_retired(&self) -> bool;

    /// Run `operation` against the owner's state.
    fn dispatch(&self, operation: &str, stateful: bool, args: &Args)
        -> Result<Value, ComponentError>;
}

/// Introspection snapshot of an [`Action`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    /// Operation name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Declared parameters.
    pub params: ParamSchema,
    /// The owning component.
    pub owner: Owner,
    /// Whether invocation may mutate the owner's state.
    pub stateful: bool,
}

/// An invokable operation bound to one component instance.
///
/// Immutable after construction and cheap to clone: clones share the same
/// owner binding.
#[derive(Clone)]
pub struct Action {
    id: ActionId,
    spec: Arc<OperationSpec>,
    target: Weak<dyn ActionTarget>,
}

impl Action {
    /// Bind `spec` to `owner`, dispatching through `target`.
    pub fn bind(owner: Owner, spec: OperationSpec, target: Weak<dyn ActionTarget>) -> Self {
        Self {
            id: ActionId::new(owner, spec.name.clone()),
            spec: Arc::new(spec),
            target,
        }
    }

    /// The action's identity.
    pub fn id(&self) -> &ActionId {
        &self.id
    }

    /// The operation name.
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Declared parameters.
    pub fn params(&self) -> &ParamSchema {
        &self.spec.params
    }

    /// Whether invocation may mutate the owner's state.
    pub fn is_stateful(&self) -> bool {
        self.spec.stateful
    }

    /// Introspect the action. Has no side effects.
    pub fn describe(&self) -> ActionDescriptor {
        ActionDescriptor {
            name: self.spec.name.clone(),
            description: self.spec.description.clone(),
            params: self.spec.params.clone(),
            owner: self.id.owner.clone(),
            stateful: self.spec.stateful,
        }
    }

    /// Whether the owner is still registered.
    pub fn is_available(&self) -> bool {
        self.target
            .upgrade()
            .is_some_and(|target| !target.is_retired())
    }

    /// Validate `args` and run the bound operation.
    ///
    /// # Errors
    ///
    /// - [`ActionError::InvalidArguments`] if `args` do not match the schema.
    /// - [`ActionError::OwnerUnavailable`] if the owner was deregistered.
    /// - [`ActionError::Failed`] carrying the component's own error.
    pub fn invoke(&self, args: &Args) -> Result<Value, ActionError> {
        self.spec
            .params
            .validate(args)
            .map_err(|reason| ActionError::InvalidArguments {
                action: self.id.clone(),
                reason,
            })?;
        let target = self
            .target
            .upgrade()
            .filter(|target| !target.is_retired())
            .ok_or_else(|| ActionError::OwnerUnavailable {
                action: self.id.clone(),
            })?;
        target
            .dispatch(&self.spec.name, self.spec.stateful, args)
            .map_err(|source| ActionError::Failed {
                action: self.id.clone(),
                source,
            })
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("id", &self.id)
            .field("stateful", &self.spec.stateful)
            .field("available", &self.is_available())
            .finish()
    }
}

/// An ordered set of actions keyed by [`ActionId`].
///
/// Iteration order is insertion order: components in registration order,
/// then each component's operations in declaration order.
#[derive(Clone, Debug, Default)]
pub struct ActionSet {
    actions: IndexMap<ActionId, Action>,
}

impl ActionSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an action. An action with the same id is replaced in place.
    pub fn insert(&mut self, action: Action) {
        self.actions.insert(action.id().clone(), action);
    }

    /// Look up an action by id.
    pub fn get(&self, id: &ActionId) -> Option<&Action> {
        self.actions.get(id)
    }

    /// Resolve an action by id, failing with [`ActionError::UnknownAction`].
    pub fn resolve(&self, id: &ActionId) -> Result<&Action, ActionError> {
        self.get(id)
            .ok_or_else(|| ActionError::UnknownAction { action: id.clone() })
    }

    /// Whether the set holds `id`.
    pub fn contains(&self, id: &ActionId) -> bool {
        self.actions.contains_key(id)
    }

    /// Number of actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Actions in order.
    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.actions.values()
    }

    /// Action ids in order.
    pub fn ids(&self) -> impl Iterator<Item = &ActionId> {
        self.actions.keys()
    }

    /// Append every action of `other` not already present.
    pub fn union(mut self, other: &ActionSet) -> ActionSet {
        for action in other.iter() {
            if !self.contains(action.id()) {
                self.insert(action.clone());
            }
        }
        self
    }
}

impl FromIterator<Action> for ActionSet {
    fn from_iter<I: IntoIterator<Item = Action>>(iter: I) -> Self {
        let mut set = Self::new();
        for action in iter {
            set.insert(action);
        }
        set
    }
}

impl Extend<Action> for ActionSet {
    fn extend<I: IntoIterator<Item = Action>>(&mut self, iter: I) {
        for action in iter {
            self.insert(action);
        }
    }
}

/// A fully specified invocation chosen by a policy.
///
/// # Examples
///
/// ```
/// use dyad_core::{ActionId, ActionRequest, Value};
///
/// let req = ActionRequest::new(ActionId::environment("counter", "increment"))
///     .arg("by", 1);
/// assert_eq!(req.args.get("by"), Some(&Value::from(1)));
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    /// The action to invoke.
    pub action: ActionId,
    /// Concrete argument values.
    pub args: Args,
    /// Optional rationale from the policy, recorded in agent state.
    pub thoughts: Option<Value>,
}

impl ActionRequest {
    /// A request with no arguments.
    pub fn new(action: ActionId) -> Self {
        Self {
            action,
            args: Args::new(),
            thoughts: None,
        }
    }

    /// Add one argument.
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }

    /// Attach the policy's rationale.
    pub fn with_thoughts(mut self, thoughts: impl Into<Value>) -> Self {
        self.thoughts = Some(thoughts.into());
        self
    }
}

/// One directive returned by a policy per decision.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Decision {
    /// Invoke an action.
    Act(ActionRequest),
    /// Hold for `duration` logical time units before observing again.
    Idle {
        /// Logical time to hold, in the agent's heartbeat units.
        duration: f64,
    },
}

impl Decision {
    /// Shorthand for [`Decision::Idle`].
    pub fn idle(duration: f64) -> Self {
        Self::Idle { duration }
    }
}

impl From<ActionRequest> for Decision {
    fn from(req: ActionRequest) -> Self {
        Self::Act(req)
    }
}
