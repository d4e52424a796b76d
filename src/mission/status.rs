//! Mission status graph
//!
//! The lifecycle is a small directed graph with three terminal states:
//!
//! ```text
//! Requested -> Accepted -> Assigned -> InTransit -> Delivered
//!     |                                                ^
//!     +-> Rejected        (any non-terminal) -> Failed-+
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Mission status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    /// Patient submitted the request; awaiting clinic review
    Requested,
    /// A clinic took ownership of the request
    Accepted,
    /// A drone has been reserved for the mission
    Assigned,
    /// Launch confirmed; payload en route
    InTransit,
    /// Delivery confirmed (terminal)
    Delivered,
    /// Clinic declined the request (terminal)
    Rejected,
    /// Irrecoverable fault (terminal)
    Failed,
}

impl Default for MissionStatus {
    fn default() -> Self {
        Self::Requested
    }
}

impl MissionStatus {
    /// True if no further transition is permitted from this status
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            MissionStatus::Delivered | MissionStatus::Rejected | MissionStatus::Failed
        )
    }

    /// Whether `self -> next` is an edge of the lifecycle graph
    pub fn can_become(self, next: MissionStatus) -> bool {
        use MissionStatus::*;
        match (self, next) {
            (Requested, Accepted) => true,
            (Requested, Rejected) => true,
            (Accepted, Assigned) => true,
            (Assigned, InTransit) => true,
            (InTransit, Delivered) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MissionStatus::Requested => "requested",
            MissionStatus::Accepted => "accepted",
            MissionStatus::Assigned => "assigned",
            MissionStatus::InTransit => "in_transit",
            MissionStatus::Delivered => "delivered",
            MissionStatus::Rejected => "rejected",
            MissionStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "requested" => Some(MissionStatus::Requested),
            "accepted" => Some(MissionStatus::Accepted),
            "assigned" => Some(MissionStatus::Assigned),
            "in_transit" => Some(MissionStatus::InTransit),
            "delivered" => Some(MissionStatus::Delivered),
            "rejected" => Some(MissionStatus::Rejected),
            "failed" => Some(MissionStatus::Failed),
            _ => None,
        }
    }

    /// Human wording used in notification subjects
    pub fn headline(&self) -> &'static str {
        match self {
            MissionStatus::Requested => "Delivery Request Confirmed",
            MissionStatus::Accepted => "Delivery Request Accepted",
            MissionStatus::Assigned => "Drone Assigned to Your Delivery",
            MissionStatus::InTransit => "Your Delivery Is En Route",
            MissionStatus::Delivered => "Delivery Completed",
            MissionStatus::Rejected => "Delivery Request Declined",
            MissionStatus::Failed => "Delivery Could Not Be Completed",
        }
    }
}

impl fmt::Display for MissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use MissionStatus::*;

    const ALL: [MissionStatus; 7] = [
        Requested, Accepted, Assigned, InTransit, Delivered, Rejected, Failed,
    ];

    #[test]
    fn test_success_path_edges() {
        assert!(Requested.can_become(Accepted));
        assert!(Accepted.can_become(Assigned));
        assert!(Assigned.can_become(InTransit));
        assert!(InTransit.can_become(Delivered));
    }

    #[test]
    fn test_rejection_edge() {
        assert!(Requested.can_become(Rejected));
        assert!(!Accepted.can_become(Rejected));
    }

    #[test]
    fn test_failed_reachable_from_every_non_terminal() {
        for from in [Requested, Accepted, Assigned, InTransit] {
            assert!(from.can_become(Failed), "{from} -> failed should be allowed");
        }
    }

    #[test]
    fn test_terminal_states_have_no_outgoing_edges() {
        for from in [Delivered, Rejected, Failed] {
            for to in ALL {
                assert!(!from.can_become(to), "{from} -> {to} should be forbidden");
            }
        }
    }

    #[test]
    fn test_no_skipping_states() {
        assert!(!Requested.can_become(Assigned));
        assert!(!Requested.can_become(InTransit));
        assert!(!Requested.can_become(Delivered));
        assert!(!Accepted.can_become(InTransit));
        assert!(!Accepted.can_become(Delivered));
        assert!(!Assigned.can_become(Delivered));
    }

    #[test]
    fn test_no_backward_edges() {
        assert!(!Accepted.can_become(Requested));
        assert!(!Assigned.can_become(Accepted));
        assert!(!InTransit.can_become(Assigned));
    }

    #[test]
    fn test_string_round_trip() {
        for status in ALL {
            assert_eq!(MissionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(MissionStatus::parse("cancelled"), None);
    }

    #[test]
    fn test_terminal_set() {
        assert!(Delivered.is_terminal());
        assert!(Rejected.is_terminal());
        assert!(Failed.is_terminal());
        assert!(!Requested.is_terminal());
        assert!(!InTransit.is_terminal());
    }
}
