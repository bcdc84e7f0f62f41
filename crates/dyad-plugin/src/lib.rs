//! Component and policy capability traits for the Dyad runtime.
//!
//! Domain logic plugs into an environment or an agent as a [`Component`]:
//! it owns a private state slice, declares operations that become bound
//! [`Action`](dyad_core::Action)s, and advances on its owner's clock
//! ([`EnvironmentComponent::on_tick`] or [`AgentComponent::on_heartbeat`]).
//! Decisions come from a [`Policy`].
//!
//! [`ComponentRegistry`] and [`ComponentCell`] are the containers both
//! owners use to hold components, bind their actions, and serialize access.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod cell;
pub mod component;
pub mod policy;
pub mod registry;

pub use cell::{AgentCell, ComponentCell, EnvironmentCell};
pub use component::{AgentComponent, Component, EnvironmentComponent, HeartbeatContext, TickContext};
pub use policy::{FnPolicy, Policy};
pub use registry::{validate_component_id, validate_operations, ComponentRegistry, RegistryError};
