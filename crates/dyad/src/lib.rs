//! Dyad: a runtime for pluggable agents and environments driven by
//! independent clocks.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all Dyad sub-crates. For most users, adding `dyad` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use dyad::prelude::*;
//!
//! // An environment component holding a single counter.
//! struct Counter { count: i64 }
//!
//! impl Component for Counter {
//!     fn state(&self) -> State {
//!         [("count", self.count)].into_iter().collect()
//!     }
//!     fn operations(&self) -> Vec<OperationSpec> {
//!         vec![OperationSpec::stateful(
//!             "increment",
//!             "Add `by` to the counter.",
//!             ParamSchema::new([ParamSpec::required("by", ParamType::Integer)]),
//!         )]
//!     }
//!     fn perform(&mut self, _op: &str, args: &Args) -> Result<Value, ComponentError> {
//!         self.count += args["by"].as_i64().unwrap_or(0);
//!         Ok(Value::from(self.count))
//!     }
//! }
//!
//! impl EnvironmentComponent for Counter {
//!     fn on_tick(&mut self, _ctx: &TickContext) -> Result<(), ComponentError> {
//!         Ok(())
//!     }
//! }
//!
//! let env = Arc::new(
//!     Environment::new(EnvironmentConfig::default().with_component("counter", Counter { count: 0 }))
//!         .unwrap(),
//! );
//!
//! // A policy that increments on every decision.
//! let policy = FnPolicy::new("clicker", |_state: &State, _actions: &ActionSet| {
//!     ActionRequest::new(ActionId::environment("counter", "increment"))
//!         .arg("by", 1)
//!         .into()
//! });
//! let mut agent = Agent::new(AgentConfig::new("clicker", policy, Arc::clone(&env))).unwrap();
//!
//! for _ in 0..3 {
//!     agent.cycle();
//! }
//! assert_eq!(env.observe().unwrap().get("count"), Some(&Value::from(3)));
//! assert_eq!(agent.phase(), Phase::Observing);
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in the prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `dyad-core` | `State`, ids, schemas, actions, decisions, errors |
//! | [`plugin`] | `dyad-plugin` | Component and policy traits, cells, the registry |
//! | [`engine`] | `dyad-engine` | Environment, agent, configs, metrics, drivers |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types and errors (`dyad-core`).
///
/// Contains [`types::State`] and its merge policy, identifiers, parameter
/// schemas, the [`types::Action`] binding, and policy directives.
pub use dyad_core as types;

/// Capability traits for plugin authors (`dyad-plugin`).
///
/// [`plugin::EnvironmentComponent`], [`plugin::AgentComponent`] and
/// [`plugin::Policy`] are the extension points for domain logic.
pub use dyad_plugin as plugin;

/// The runtime (`dyad-engine`).
///
/// [`engine::Environment`] and [`engine::Agent`] for lockstep use,
/// [`engine::EnvironmentDriver`] and [`engine::AgentDriver`] to run either
/// clock on its own thread.
pub use dyad_engine as engine;

/// Common imports for typical Dyad usage.
///
/// ```rust
/// use dyad::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use dyad_core::{
        ActionId, ActionRequest, ActionSet, Args, Decision, OnConflict, OperationSpec,
        ParamSchema, ParamSpec, ParamType, State, Value,
    };

    // Errors
    pub use dyad_core::{ActionError, ComponentError, MergeError};

    // Plugin traits
    pub use dyad_plugin::{
        AgentComponent, Component, EnvironmentComponent, FnPolicy, HeartbeatContext, Policy,
        TickContext,
    };

    // Engine
    pub use dyad_engine::{
        Agent, AgentConfig, AgentDriver, ClockConfig, ConfigError, Environment,
        EnvironmentConfig, EnvironmentDriver, Phase, StepOutcome, TickError, TickReport,
    };
}
