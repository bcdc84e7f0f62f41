//! Strongly-typed identifiers for components, actions, and clock steps.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Identifies a component within its owning environment or agent.
///
/// Ids are chosen by the caller at registration and must be unique within
/// one owner. The id doubles as the namespace of the component's actions.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(Arc<str>);

impl ComponentId {
    /// Create an id from any string-like value.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ComponentId {
    fn from(v: &str) -> Self {
        Self::new(v)
    }
}

impl From<String> for ComponentId {
    fn from(v: String) -> Self {
        Self(Arc::from(v))
    }
}

/// Monotonically increasing environment tick counter.
///
/// Incremented each time an environment completes a full component
/// fanout, whether or not individual components failed.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TickId(pub u64);

impl fmt::Display for TickId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TickId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Monotonically increasing agent heartbeat counter.
///
/// Incremented each time an agent delivers heartbeats to its components,
/// which happens on every step outside the idle phase.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct BeatId(pub u64);

impl fmt::Display for BeatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for BeatId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Which kind of owner a component is registered into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    /// Component owned by an environment, advanced by ticks.
    Environment,
    /// Component owned by an agent, advanced by heartbeats.
    Agent,
}

impl Domain {
    /// Lower-case name used in textual action ids.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Environment => "environment",
            Self::Agent => "agent",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single component instance an action is allowed to mutate.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Owner {
    /// Whether the component lives in an environment or an agent.
    pub domain: Domain,
    /// The component's registration id.
    pub component: ComponentId,
}

impl Owner {
    /// An environment component owner.
    pub fn environment(component: impl Into<ComponentId>) -> Self {
        Self {
            domain: Domain::Environment,
            component: component.into(),
        }
    }

    /// An agent component owner.
    pub fn agent(component: impl Into<ComponentId>) -> Self {
        Self {
            domain: Domain::Agent,
            component: component.into(),
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.domain, self.component)
    }
}

/// Identity of an action: the owning component plus the operation name.
///
/// Namespacing by owner means an agent component and an environment
/// component may expose operations with the same name without colliding.
/// The textual form is `environment/counter.increment`.
///
/// # Examples
///
/// ```
/// use dyad_core::ActionId;
///
/// let id = ActionId::environment("counter", "increment");
/// assert_eq!(id.to_string(), "environment/counter.increment");
/// assert_eq!(id.name(), "increment");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionId {
    /// The component the action is bound to.
    pub owner: Owner,
    /// The operation name, unique within the owner.
    pub operation: String,
}

impl ActionId {
    /// Build an id from an owner and operation name.
    pub fn new(owner: Owner, operation: impl Into<String>) -> Self {
        Self {
            owner,
            operation: operation.into(),
        }
    }

    /// Id of an operation exposed by an environment component.
    pub fn environment(component: impl Into<ComponentId>, operation: impl Into<String>) -> Self {
        Self::new(Owner::environment(component), operation)
    }

    /// Id of an operation exposed by an agent component.
    pub fn agent(component: impl Into<ComponentId>, operation: impl Into<String>) -> Self {
        Self::new(Owner::agent(component), operation)
    }

    /// The operation name.
    pub fn name(&self) -> &str {
        &self.operation
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.owner, self.operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_operation_in_both_domains_is_distinct() {
        let env = ActionId::environment("inventory", "drop");
        let agent = ActionId::agent("inventory", "drop");
        assert_ne!(env, agent);
        assert_eq!(agent.to_string(), "agent/inventory.drop");
    }

    #[test]
    fn component_id_serializes_as_plain_string() {
        let id = ComponentId::new("counter");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"counter\"");
    }
}
