//! Mission data structures
//!
//! A mission is a single medical-delivery request tracked through its
//! lifecycle. Missions are only ever mutated through `MissionControl`; the
//! store keeps them forever (terminal missions are archived, not deleted).

use super::MissionStatus;
use crate::auth::Role;
use crate::notify::EmailAddress;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store-assigned mission identifier
pub type MissionId = i64;

/// What kind of run the drone is making
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionKind {
    Delivery,
    Pickup,
    Emergency,
}

impl Default for MissionKind {
    fn default() -> Self {
        Self::Delivery
    }
}

impl MissionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissionKind::Delivery => "delivery",
            MissionKind::Pickup => "pickup",
            MissionKind::Emergency => "emergency",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "delivery" => Some(MissionKind::Delivery),
            "pickup" => Some(MissionKind::Pickup),
            "emergency" => Some(MissionKind::Emergency),
            _ => None,
        }
    }
}

/// Mission urgency
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Emergency,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Emergency => "emergency",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Priority::Low),
            "normal" => Some(Priority::Normal),
            "high" => Some(Priority::High),
            "emergency" => Some(Priority::Emergency),
            _ => None,
        }
    }
}

/// A party attached to a mission (requester or fulfilling clinic)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    /// Stable user id from the Role Gateway
    pub id: String,

    /// Display name for notification salutations
    pub name: String,

    /// Where status notifications go, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<EmailAddress>,
}

impl Party {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: None,
        }
    }

    pub fn with_email(mut self, email: EmailAddress) -> Self {
        self.email = Some(email);
        self
    }
}

impl From<&crate::auth::Actor> for Party {
    fn from(actor: &crate::auth::Actor) -> Self {
        Self {
            id: actor.identity.id.clone(),
            name: actor.identity.name.clone(),
            email: actor.identity.email.clone(),
        }
    }
}

/// One entry in a mission's append-only audit trail
///
/// Entry 0 records creation; each subsequent entry records one transition.
/// The trail length is always the mission version + 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub mission_id: MissionId,
    pub seq: u64,
    pub status: MissionStatus,
    pub actor_id: String,
    pub actor_role: Role,
    pub occurred_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Input for creating a mission
#[derive(Debug, Clone)]
pub struct MissionDraft {
    pub requester: Party,
    pub kind: MissionKind,
    pub priority: Priority,
    pub items: String,
    pub delivery_address: String,
    pub delivery_lat: Option<f64>,
    pub delivery_lon: Option<f64>,
}

impl MissionDraft {
    pub fn new(requester: Party, items: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            requester,
            kind: MissionKind::default(),
            priority: Priority::default(),
            items: items.into(),
            delivery_address: address.into(),
            delivery_lat: None,
            delivery_lon: None,
        }
    }

    pub fn with_kind(mut self, kind: MissionKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_coordinates(mut self, lat: f64, lon: f64) -> Self {
        self.delivery_lat = Some(lat);
        self.delivery_lon = Some(lon);
        self
    }
}

/// A tracked delivery mission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mission {
    pub id: MissionId,

    /// The patient who requested the delivery
    pub requester: Party,

    /// The clinic that accepted the request (set at acceptance)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clinic: Option<Party>,

    /// The reserved drone (set at assignment)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drone_id: Option<i64>,

    pub kind: MissionKind,
    pub priority: Priority,

    /// Medical item descriptor
    pub items: String,

    pub delivery_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_lon: Option<f64>,

    pub status: MissionStatus,

    /// Number of committed transitions; the optimistic-concurrency token
    pub version: u64,

    pub requested_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launched_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Stamped when the mission reaches a terminal status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Mission {
    /// True once the mission has reached a terminal status
    pub fn is_closed(&self) -> bool {
        self.status.is_terminal()
    }
}
