//! Roles and the Role Gateway contract
//!
//! The core never authenticates callers itself. A `RoleGateway`
//! implementation turns credentials into an authenticated `Actor` (identity
//! plus role); the state machine then only consults the role capability
//! table. `StaticGateway` backs tests and the operator CLI.

use crate::notify::EmailAddress;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Caller role gating which transitions may be invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// A patient requesting deliveries
    Patient,
    /// A clinic reviewing and fulfilling requests
    Clinic,
    /// A platform administrator
    Admin,
    /// Automated callers driven by external signals (telemetry, ground station)
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Clinic => "clinic",
            Role::Admin => "admin",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Role {
    type Err = crate::AeromedError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "patient" => Ok(Role::Patient),
            "clinic" => Ok(Role::Clinic),
            "admin" => Ok(Role::Admin),
            "system" => Ok(Role::System),
            other => Err(crate::AeromedError::Auth(format!("unknown role '{}'", other))),
        }
    }
}

/// An authenticated identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable user id (opaque to the core)
    pub id: String,

    /// Display name used in notification salutations
    pub name: String,

    /// Contact address for status notifications, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<EmailAddress>,
}

impl Identity {
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

/// An authenticated caller: identity plus role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub identity: Identity,
    pub role: Role,
}

impl Actor {
    pub fn new(identity: Identity, role: Role) -> Self {
        Self { identity, role }
    }

    pub fn id(&self) -> &str {
        &self.identity.id
    }
}

/// Login credentials presented to the gateway
#[derive(Debug, Clone)]
pub struct Credentials {
    pub user: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            secret: secret.into(),
        }
    }
}

/// External collaborator: authenticates a caller and supplies their role
pub trait RoleGateway: Send + Sync {
    /// Authenticate credentials into an actor
    ///
    /// # Errors
    /// Returns `AeromedError::Auth` when the credentials are not recognized.
    fn authenticate(&self, credentials: &Credentials) -> Result<Actor>;
}

/// In-memory account table for tests and the operator CLI
#[derive(Debug, Default)]
pub struct StaticGateway {
    accounts: HashMap<String, (String, Actor)>,
}

impl StaticGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account
    pub fn with_account(mut self, secret: impl Into<String>, actor: Actor) -> Self {
        self.accounts
            .insert(actor.identity.id.clone(), (secret.into(), actor));
        self
    }
}

impl RoleGateway for StaticGateway {
    fn authenticate(&self, credentials: &Credentials) -> Result<Actor> {
        match self.accounts.get(&credentials.user) {
            Some((secret, actor)) if *secret == credentials.secret => Ok(actor.clone()),
            Some(_) => Err(crate::AeromedError::Auth(format!(
                "invalid secret for user '{}'",
                credentials.user
            ))),
            None => Err(crate::AeromedError::Auth(format!(
                "unknown user '{}'",
                credentials.user
            ))),
        }
    }
}
