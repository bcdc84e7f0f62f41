//! Core types for the Dyad agent/environment runtime.
//!
//! This is the leaf crate with zero internal dependencies. It defines the
//! data substrate shared by every layer: [`State`], identifiers, parameter
//! schemas, the [`Action`] binding, policy directives, and error types.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod action;
pub mod error;
pub mod id;
pub mod schema;
pub mod state;

/// Any serializable scalar or composite stored in a [`State`].
pub use serde_json::Value;

pub use action::{
    Action, ActionDescriptor, ActionRequest, ActionSet, ActionTarget, Decision, OperationSpec,
};
pub use error::{ActionError, ComponentError, MergeError};
pub use id::{ActionId, BeatId, ComponentId, Domain, Owner, TickId};
pub use schema::{Args, ParamSchema, ParamSpec, ParamType};
pub use state::{OnConflict, State};
