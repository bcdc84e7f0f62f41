//! Error types for the Dyad runtime.
//!
//! Organized by the boundary that surfaces them: state merging, component
//! operation bodies, and action invocation/resolution.

use std::error::Error;
use std::fmt;

use crate::id::ActionId;

/// Errors from [`State::merge`](crate::State::merge).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MergeError {
    /// Both sides define `key` with differing values and the merge was
    /// asked to fail on conflict.
    KeyConflict {
        /// The contested key, including any merge prefix.
        key: String,
    },
}

impl fmt::Display for MergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyConflict { key } => write!(f, "conflicting values for key '{key}'"),
        }
    }
}

impl Error for MergeError {}

/// Errors raised by a component's own operation or clock callback.
///
/// Opaque to the runtime: it is wrapped and propagated, never interpreted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ComponentError {
    /// The operation body or clock callback failed.
    Failed {
        /// Human-readable description of the failure.
        reason: String,
    },
    /// The component was asked to run an operation it does not implement.
    UnsupportedOperation {
        /// The requested operation name.
        operation: String,
    },
}

impl ComponentError {
    /// Shorthand for [`ComponentError::Failed`].
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ComponentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed { reason } => write!(f, "component failed: {reason}"),
            Self::UnsupportedOperation { operation } => {
                write!(f, "operation '{operation}' is not supported")
            }
        }
    }
}

impl Error for ComponentError {}

/// Errors from resolving or invoking an [`Action`](crate::Action).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActionError {
    /// Arguments do not match the declared parameter schema.
    InvalidArguments {
        /// The action that rejected the arguments.
        action: ActionId,
        /// What was wrong with them.
        reason: String,
    },
    /// A policy referenced an action that is not in the available set.
    UnknownAction {
        /// The unresolved action id.
        action: ActionId,
    },
    /// The action's owning component has been deregistered or dropped.
    OwnerUnavailable {
        /// The orphaned action.
        action: ActionId,
    },
    /// The bound operation ran and reported a domain error.
    Failed {
        /// The action that failed.
        action: ActionId,
        /// The component's own error.
        source: ComponentError,
    },
}

impl ActionError {
    /// Stable short name of the error kind, as recorded in agent state.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArguments { .. } => "invalid_arguments",
            Self::UnknownAction { .. } => "unknown_action",
            Self::OwnerUnavailable { .. } => "owner_unavailable",
            Self::Failed { .. } => "failed",
        }
    }

    /// The action the error refers to.
    pub fn action(&self) -> &ActionId {
        match self {
            Self::InvalidArguments { action, .. }
            | Self::UnknownAction { action }
            | Self::OwnerUnavailable { action }
            | Self::Failed { action, .. } => action,
        }
    }
}

impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArguments { action, reason } => {
                write!(f, "invalid arguments for '{action}': {reason}")
            }
            Self::UnknownAction { action } => write!(f, "unknown action '{action}'"),
            Self::OwnerUnavailable { action } => {
                write!(f, "owner of action '{action}' is no longer registered")
            }
            Self::Failed { action, source } => write!(f, "action '{action}' failed: {source}"),
        }
    }
}

impl Error for ActionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Failed { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_action_chains_component_error() {
        let err = ActionError::Failed {
            action: ActionId::environment("door", "open"),
            source: ComponentError::failed("jammed"),
        };
        assert_eq!(err.kind(), "failed");
        assert_eq!(
            err.to_string(),
            "action 'environment/door.open' failed: component failed: jammed"
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn kinds_are_distinct() {
        let id = ActionId::agent("memory", "store");
        let kinds = [
            ActionError::InvalidArguments {
                action: id.clone(),
                reason: String::new(),
            }
            .kind(),
            ActionError::UnknownAction { action: id.clone() }.kind(),
            ActionError::OwnerUnavailable { action: id }.kind(),
        ];
        assert_eq!(kinds, ["invalid_arguments", "unknown_action", "owner_unavailable"]);
    }
}
