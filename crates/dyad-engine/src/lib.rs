//! Agent and environment engine for the Dyad runtime.
//!
//! Provides the shared [`Environment`], the [`Agent`] phase machine, their
//! configuration and metrics, and threaded drivers that run either clock
//! on its own thread. Everything is also usable lockstep: call
//! [`Environment::tick`] and [`Agent::step`] from any cadence you like.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod agent;
pub mod config;
pub mod environment;
pub mod metrics;
pub mod realtime;

pub use agent::{keys, Agent, Phase, StepOutcome, StepReport, StopHandle};
pub use config::{AgentConfig, ClockConfig, ConfigError, EnvironmentConfig};
pub use environment::{
    ComponentFailure, Deregistration, Environment, EnvironmentError, Observation, Registration,
    TickError, TickReport,
};
pub use metrics::{AgentMetrics, TickMetrics};
pub use realtime::{AgentDriver, EnvironmentDriver, ShutdownReport, TickOutcome};
