//! Simulation errors

use thiserror::Error;

/// Simulation result type
pub type Result<T> = std::result::Result<T, SimError>;

/// Errors raised while building or stepping an orchestrator.
///
/// Lookup misses (unknown scenario or action names) are not errors; those
/// surface as `false` or an empty map.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("solver {solver} declares no owned keys")]
    EmptyOwnership { solver: String },

    #[error("key {key} is owned by both {first} and {second}")]
    OverlappingOwnership {
        key: String,
        first: String,
        second: String,
    },

    #[error("invalid time step {dt}: must be finite and positive")]
    InvalidTimeStep { dt: f64 },

    #[error("solver {solver} wrote undeclared key {key}")]
    UndeclaredSolverWrite { solver: String, key: String },

    #[error("computation failed in {component}: {message}")]
    Computation { component: String, message: String },

    #[error("invalid run config: {0}")]
    Config(String),
}

impl SimError {
    /// Shorthand for a computation failure raised by a component.
    pub fn computation(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Computation {
            component: component.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for SimError {
    fn from(e: serde_json::Error) -> Self {
        Self::Config(e.to_string())
    }
}
