//! Mission persistence
//!
//! The `MissionStore` trait is the persistence contract of the lifecycle
//! core. Its one non-obvious requirement is optimistic concurrency on
//! transition writes: `append_transition` carries the version the caller
//! observed, and the store commits only if the mission still has that
//! version. Losers of a race get `AppendOutcome::Conflict`, never a partial
//! write.

mod sqlite;

pub use sqlite::SqliteStore;

use crate::auth::Actor;
use crate::drone::{Drone, DroneStatus};
use crate::mission::{AuditEntry, Mission, MissionDraft, MissionId, MissionStatus, Party};
use crate::Result;
use chrono::{DateTime, Utc};

/// Result of an `append_transition` attempt
#[derive(Debug)]
pub enum AppendOutcome {
    /// The transition was committed; the refreshed mission is returned
    Committed(Mission),
    /// Another transition committed first; caller must re-read and retry
    Conflict,
}

/// Everything persisted alongside a status change, as one atomic unit
#[derive(Debug)]
pub struct TransitionRecord<'a> {
    pub new_status: MissionStatus,
    pub actor: &'a Actor,
    pub occurred_at: DateTime<Utc>,
    /// Free-form note recorded in the audit trail (e.g. a failure reason)
    pub note: Option<String>,
    /// Attach the fulfilling clinic (acceptance)
    pub set_clinic: Option<&'a Party>,
    /// Reserve this drone; fails if it is not available
    pub assign_drone: Option<i64>,
    /// Return the mission's drone to the available pool (terminal outcomes)
    pub release_drone: bool,
}

impl<'a> TransitionRecord<'a> {
    pub fn new(new_status: MissionStatus, actor: &'a Actor, occurred_at: DateTime<Utc>) -> Self {
        Self {
            new_status,
            actor,
            occurred_at,
            note: None,
            set_clinic: None,
            assign_drone: None,
            release_drone: false,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_clinic(mut self, clinic: &'a Party) -> Self {
        self.set_clinic = Some(clinic);
        self
    }

    pub fn with_drone(mut self, drone_id: i64) -> Self {
        self.assign_drone = Some(drone_id);
        self
    }

    pub fn releasing_drone(mut self) -> Self {
        self.release_drone = true;
        self
    }
}

/// Persistence contract for missions, their audit trail, and the fleet roster
pub trait MissionStore: Send + Sync {
    /// Persist a new mission in `Requested` status, including audit entry 0
    fn create(&self, draft: &MissionDraft, requested_at: DateTime<Utc>) -> Result<Mission>;

    /// Fetch a mission by id
    ///
    /// # Errors
    /// `MissionNotFound` if the id is unknown.
    fn get(&self, id: MissionId) -> Result<Mission>;

    /// Atomically persist one transition: status, audit entry, and any
    /// clinic/drone attachments. Commits only if the stored version still
    /// equals `expected_version`.
    fn append_transition(
        &self,
        id: MissionId,
        expected_version: u64,
        record: TransitionRecord<'_>,
    ) -> Result<AppendOutcome>;

    /// The mission's append-only audit trail, ordered by seq
    fn audit_log(&self, id: MissionId) -> Result<Vec<AuditEntry>>;

    /// Missions, optionally filtered by status
    fn list_missions(&self, status: Option<MissionStatus>) -> Result<Vec<Mission>>;

    /// Number of missions a clinic currently holds in a non-terminal,
    /// post-acceptance status
    fn active_clinic_missions(&self, clinic_id: &str) -> Result<u64>;

    // --- Fleet roster ---

    /// Register a drone (initially available)
    fn add_drone(&self, name: &str) -> Result<Drone>;

    /// Fetch a drone by id
    fn get_drone(&self, id: i64) -> Result<Drone>;

    /// All registered drones
    fn list_drones(&self) -> Result<Vec<Drone>>;

    /// Set a drone's status outside of mission transitions (maintenance etc.)
    fn set_drone_status(&self, id: i64, status: DroneStatus) -> Result<()>;
}
