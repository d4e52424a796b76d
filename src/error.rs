//! Error types for Aeromed
//!
//! Defines a comprehensive error enum covering all failure modes across the
//! system. Uses thiserror for ergonomic error handling.

use crate::mission::{MissionId, MissionStatus};
use crate::notify::{AddressError, TransportError};
use thiserror::Error;

/// Result type alias for Aeromed operations
pub type Result<T> = std::result::Result<T, AeromedError>;

/// Comprehensive error type for Aeromed operations
#[derive(Error, Debug)]
pub enum AeromedError {
    /// Transition not present in the lifecycle graph
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition {
        from: MissionStatus,
        to: MissionStatus,
    },

    /// Actor's role does not permit the attempted action
    #[error("role '{role}' is not permitted to {action}")]
    Unauthorized { role: String, action: String },

    /// Mission already reached a terminal status
    #[error("mission is closed in terminal status '{status}'")]
    MissionClosed { status: MissionStatus },

    /// A concurrent transition won the race; the caller must re-read and retry
    #[error("mission {0} was modified concurrently")]
    ConcurrentModification(MissionId),

    /// Mission not found
    #[error("mission not found: {0}")]
    MissionNotFound(MissionId),

    /// Drone not found
    #[error("drone not found: {0}")]
    DroneNotFound(i64),

    /// Drone exists but cannot be assigned
    #[error("drone {id} is not available (status '{status}')")]
    DroneUnavailable { id: i64, status: String },

    /// Clinic already holds its configured number of active missions
    #[error("clinic '{clinic}' is at capacity ({active}/{limit} active missions)")]
    ClinicAtCapacity {
        clinic: String,
        active: u64,
        limit: u32,
    },

    /// Request payload failed validation
    #[error("validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage errors not covered by the database driver (corrupt rows etc.)
    #[error("storage error: {0}")]
    Storage(String),

    /// Authentication errors
    #[error("authentication error: {0}")]
    Auth(String),

    /// Mail transport errors (configuration-level operations only;
    /// per-transition dispatch failures are reported as outcomes, not errors)
    #[error("mail transport error: {0}")]
    Mail(#[from] TransportError),

    /// Email address parsing errors
    #[error("address error: {0}")]
    Address(#[from] AddressError),

    /// SQLite database errors
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Anyhow errors (for more context)
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
}

impl AeromedError {
    /// True for errors the initiating caller can correct and resubmit
    pub fn is_caller_correctable(&self) -> bool {
        matches!(
            self,
            AeromedError::InvalidTransition { .. }
                | AeromedError::Unauthorized { .. }
                | AeromedError::MissionClosed { .. }
                | AeromedError::ConcurrentModification(_)
                | AeromedError::MissionNotFound(_)
                | AeromedError::DroneNotFound(_)
                | AeromedError::DroneUnavailable { .. }
                | AeromedError::ClinicAtCapacity { .. }
                | AeromedError::Validation(_)
        )
    }
}
