//! Construction-time configuration, validation, and error types.
//!
//! Every object in the engine is built from a plain config struct whose
//! `validate()` runs before anything is constructed, so malformed setups
//! fail at construction and never mid-run.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use dyad_core::ComponentId;
use dyad_plugin::{validate_component_id, AgentComponent, EnvironmentComponent, Policy, RegistryError};

use crate::environment::Environment;

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected while building or reconfiguring engine objects.
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigError {
    /// Component registration or deregistration was rejected.
    Registry(RegistryError),
    /// A logical period or heartbeat length is NaN, infinite, zero, or
    /// negative.
    InvalidPeriod {
        /// The invalid value.
        value: f64,
    },
    /// The agent name is empty.
    EmptyAgentName,
    /// `rate_hz` is NaN, infinite, zero, or negative.
    InvalidTickRate {
        /// The invalid value.
        value: f64,
    },
    /// The report channel capacity is zero.
    ReportCapacityZero,
    /// A background thread could not be spawned.
    ThreadSpawnFailed {
        /// Description of which thread failed.
        reason: String,
    },
    /// The agent could not be recovered from its driver thread (the thread
    /// panicked).
    AgentRecoveryFailed,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registry(e) => write!(f, "registry: {e}"),
            Self::InvalidPeriod { value } => {
                write!(f, "period must be finite and positive, got {value}")
            }
            Self::EmptyAgentName => write!(f, "agent name must not be empty"),
            Self::InvalidTickRate { value } => {
                write!(f, "rate_hz must be finite and positive, got {value}")
            }
            Self::ReportCapacityZero => write!(f, "report_capacity must be at least 1"),
            Self::ThreadSpawnFailed { reason } => write!(f, "thread spawn failed: {reason}"),
            Self::AgentRecoveryFailed => {
                write!(f, "agent could not be recovered from its driver thread")
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Registry(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RegistryError> for ConfigError {
    fn from(e: RegistryError) -> Self {
        Self::Registry(e)
    }
}

pub(crate) fn validate_period(value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidPeriod { value })
    }
}

fn validate_components<C: ?Sized>(components: &[(ComponentId, Box<C>)]) -> Result<(), ConfigError> {
    for (i, (id, _)) in components.iter().enumerate() {
        validate_component_id(id)?;
        if components[..i].iter().any(|(other, _)| other == id) {
            return Err(RegistryError::DuplicateComponent { id: id.clone() }.into());
        }
    }
    Ok(())
}

// ── EnvironmentConfig ──────────────────────────────────────────────

/// Configuration for an [`Environment`].
pub struct EnvironmentConfig {
    /// Components in tick order.
    pub components: Vec<(ComponentId, Box<dyn EnvironmentComponent>)>,
    /// Default logical `dt` used by [`Environment::advance`] and the tick
    /// driver. Default: 1.0.
    pub period: f64,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            components: Vec::new(),
            period: 1.0,
        }
    }
}

impl EnvironmentConfig {
    /// Append a component to the tick order.
    pub fn with_component(
        mut self,
        id: impl Into<ComponentId>,
        component: impl EnvironmentComponent,
    ) -> Self {
        self.components.push((id.into(), Box::new(component)));
        self
    }

    /// Set the default logical period.
    pub fn with_period(mut self, period: f64) -> Self {
        self.period = period;
        self
    }

    /// Validate ids and the period.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_period(self.period)?;
        validate_components(&self.components)
    }
}

impl fmt::Debug for EnvironmentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvironmentConfig")
            .field(
                "components",
                &self.components.iter().map(|(id, _)| id).collect::<Vec<_>>(),
            )
            .field("period", &self.period)
            .finish()
    }
}

// ── AgentConfig ────────────────────────────────────────────────────

/// Configuration for an [`Agent`](crate::agent::Agent).
pub struct AgentConfig {
    /// Label used in logs and thread names.
    pub name: String,
    /// Components in heartbeat order.
    pub components: Vec<(ComponentId, Box<dyn AgentComponent>)>,
    /// The decision policy.
    pub policy: Box<dyn Policy>,
    /// The environment this agent observes and acts on. Shared, not owned.
    pub environment: Arc<Environment>,
    /// Logical duration of one agent step. Default: 1.0.
    pub heartbeat_dt: f64,
}

impl AgentConfig {
    /// A config with no components and the default heartbeat.
    pub fn new(
        name: impl Into<String>,
        policy: impl Policy,
        environment: Arc<Environment>,
    ) -> Self {
        Self {
            name: name.into(),
            components: Vec::new(),
            policy: Box::new(policy),
            environment,
            heartbeat_dt: 1.0,
        }
    }

    /// Append a component to the heartbeat order.
    pub fn with_component(
        mut self,
        id: impl Into<ComponentId>,
        component: impl AgentComponent,
    ) -> Self {
        self.components.push((id.into(), Box::new(component)));
        self
    }

    /// Set the heartbeat length.
    pub fn with_heartbeat_dt(mut self, dt: f64) -> Self {
        self.heartbeat_dt = dt;
        self
    }

    /// Validate the name, ids, and heartbeat.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::EmptyAgentName);
        }
        validate_period(self.heartbeat_dt)?;
        validate_components(&self.components)
    }
}

impl fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentConfig")
            .field("name", &self.name)
            .field(
                "components",
                &self.components.iter().map(|(id, _)| id).collect::<Vec<_>>(),
            )
            .field("policy", &self.policy.name())
            .field("heartbeat_dt", &self.heartbeat_dt)
            .finish()
    }
}

// ── ClockConfig ────────────────────────────────────────────────────

/// Wall-clock pacing for the threaded drivers in [`realtime`](crate::realtime).
#[derive(Clone, Debug)]
pub struct ClockConfig {
    /// Target steps per second. Default: 60.
    pub rate_hz: f64,
    /// Capacity of the bounded report channel. Reports are dropped (and
    /// counted) when it is full. Default: 64.
    pub report_capacity: usize,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            rate_hz: 60.0,
            report_capacity: 64,
        }
    }
}

impl ClockConfig {
    /// Validate the rate and channel capacity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Also rejects subnormals whose reciprocal overflows.
        let hz = self.rate_hz;
        if !hz.is_finite() || hz <= 0.0 || !(1.0 / hz).is_finite() {
            return Err(ConfigError::InvalidTickRate { value: hz });
        }
        if self.report_capacity == 0 {
            return Err(ConfigError::ReportCapacityZero);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dyad_core::{ComponentError, State};
    use dyad_plugin::{Component, TickContext};

    struct Inert;

    impl Component for Inert {
        fn state(&self) -> State {
            State::new()
        }
    }

    impl EnvironmentComponent for Inert {
        fn on_tick(&mut self, _ctx: &TickContext) -> Result<(), ComponentError> {
            Ok(())
        }
    }

    #[test]
    fn default_environment_config_is_valid() {
        assert!(EnvironmentConfig::default().validate().is_ok());
    }

    #[test]
    fn bad_periods_rejected() {
        for p in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = EnvironmentConfig::default()
                .with_period(p)
                .validate()
                .unwrap_err();
            assert!(matches!(err, ConfigError::InvalidPeriod { .. }), "{p}");
        }
    }

    #[test]
    fn duplicate_component_ids_rejected() {
        let config = EnvironmentConfig::default()
            .with_component("a", Inert)
            .with_component("b", Inert)
            .with_component("a", Inert);
        assert_eq!(
            config.validate().unwrap_err(),
            ConfigError::Registry(RegistryError::DuplicateComponent { id: "a".into() })
        );
    }

    #[test]
    fn reserved_separators_rejected() {
        let config = EnvironmentConfig::default().with_component("a.b", Inert);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Registry(RegistryError::InvalidComponentId { .. }))
        ));
    }

    #[test]
    fn clock_config_validation() {
        assert!(ClockConfig::default().validate().is_ok());
        for hz in [0.0, -5.0, f64::NAN, f64::INFINITY, f64::MIN_POSITIVE / 4.0] {
            let config = ClockConfig {
                rate_hz: hz,
                ..ClockConfig::default()
            };
            assert!(matches!(
                config.validate(),
                Err(ConfigError::InvalidTickRate { .. })
            ));
        }
        let config = ClockConfig {
            report_capacity: 0,
            ..ClockConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ReportCapacityZero));
    }

    #[test]
    fn error_source_chains_registry() {
        let err = ConfigError::from(RegistryError::UnknownComponent { id: "x".into() });
        assert!(err.source().is_some());
        assert!(err.to_string().contains("'x'"));
    }
}
