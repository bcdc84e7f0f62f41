//! Test fixtures for Dyad development.
//!
//! Reusable components and policies for exercising environments and
//! agents without domain code:
//!
//! - [`fixtures`]: [`Counter`], [`FailingComponent`], [`PendingComponent`],
//!   [`HeartbeatProbe`].
//! - [`policies`]: [`ScriptedPolicy`], [`FixedPolicy`].

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;
pub mod policies;

pub use fixtures::{Counter, FailingComponent, HeartbeatProbe, PendingComponent};
pub use policies::{FixedPolicy, ScriptedPolicy};

use dyad_core::{ActionId, ActionRequest, Decision};

/// `environment/<component>.increment` with `by`.
pub fn increment(component: &str, by: i64) -> Decision {
    ActionRequest::new(ActionId::environment(component, "increment"))
        .arg("by", by)
        .into()
}
