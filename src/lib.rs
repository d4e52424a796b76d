//! Aeromed - Mission Lifecycle Core for Medical Drone Delivery
//!
//! Aeromed is the coordination core of a drone-based medical delivery
//! platform. It tracks a delivery mission from the moment a patient requests
//! it to a terminal outcome, enforcing who may move it forward and informing
//! the affected parties by email at every step.
//!
//! # Architecture
//!
//! - **mission**: Mission domain types, the status graph, role capabilities,
//!   and `MissionControl` (the state machine)
//! - **store**: Mission persistence (SQLite) with optimistic concurrency and
//!   the append-only audit trail
//! - **notify**: Notification dispatcher, email templates, and the SMTP
//!   transport
//! - **auth**: Roles and the Role Gateway contract
//! - **config**: YAML configuration with environment overrides
//! - **retry**: Bounded retry with exponential backoff

// Core modules
pub mod auth;
pub mod config;
pub mod drone;
pub mod error;
pub mod mission;
pub mod store;

// Components
pub mod logging;
pub mod notify;
pub mod retry;

// Re-exports
pub use error::{AeromedError, Result};
