//! Drone fleet types
//!
//! The fleet roster is tracked only as far as mission assignment needs it:
//! a drone is either available for assignment or it is not.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Drone operational status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DroneStatus {
    Available,
    Assigned,
    InFlight,
    Maintenance,
    Offline,
}

impl DroneStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DroneStatus::Available => "available",
            DroneStatus::Assigned => "assigned",
            DroneStatus::InFlight => "in_flight",
            DroneStatus::Maintenance => "maintenance",
            DroneStatus::Offline => "offline",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "available" => Some(DroneStatus::Available),
            "assigned" => Some(DroneStatus::Assigned),
            "in_flight" => Some(DroneStatus::InFlight),
            "maintenance" => Some(DroneStatus::Maintenance),
            "offline" => Some(DroneStatus::Offline),
            _ => None,
        }
    }
}

impl std::fmt::Display for DroneStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered delivery drone
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Drone {
    pub id: i64,
    pub name: String,
    pub status: DroneStatus,
    pub updated_at: DateTime<Utc>,
}
