//! Role capability table
//!
//! A single predicate drives every permission check: `allowed(role, action)`.
//! The table mirrors the transition rules one-to-one; there is no role
//! hierarchy and no transition logic re-authenticates callers.

use super::MissionStatus;
use crate::auth::Role;
use std::fmt;

/// A lifecycle action an actor can attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionAction {
    /// Create a new mission (none -> Requested)
    Request,
    /// Requested -> Accepted
    Accept,
    /// Requested -> Rejected
    Reject,
    /// Accepted -> Assigned
    Assign,
    /// Assigned -> InTransit
    Launch,
    /// InTransit -> Delivered
    Deliver,
    /// any non-terminal -> Failed
    Fail,
}

impl TransitionAction {
    /// The status this action moves a mission into
    pub fn target(&self) -> MissionStatus {
        match self {
            TransitionAction::Request => MissionStatus::Requested,
            TransitionAction::Accept => MissionStatus::Accepted,
            TransitionAction::Reject => MissionStatus::Rejected,
            TransitionAction::Assign => MissionStatus::Assigned,
            TransitionAction::Launch => MissionStatus::InTransit,
            TransitionAction::Deliver => MissionStatus::Delivered,
            TransitionAction::Fail => MissionStatus::Failed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionAction::Request => "request a delivery",
            TransitionAction::Accept => "accept a mission",
            TransitionAction::Reject => "reject a mission",
            TransitionAction::Assign => "assign a drone",
            TransitionAction::Launch => "confirm launch",
            TransitionAction::Deliver => "confirm delivery",
            TransitionAction::Fail => "mark a mission failed",
        }
    }
}

impl fmt::Display for TransitionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability predicate: may `role` perform `action`?
pub fn allowed(role: Role, action: TransitionAction) -> bool {
    use TransitionAction::*;
    match action {
        Request => role == Role::Patient,
        Accept | Reject => role == Role::Clinic,
        Assign => matches!(role, Role::Clinic | Role::Admin),
        Launch | Deliver | Fail => matches!(role, Role::Admin | Role::System),
    }
}
