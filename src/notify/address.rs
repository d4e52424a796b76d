//! Email addressing
//!
//! Provides type-safe, validated email addresses for notification
//! recipients and senders.
//!
//! # Examples
//!
//! ```
//! use aeromed::notify::EmailAddress;
//!
//! let addr: EmailAddress = "amara@example.sl".parse().unwrap();
//! assert_eq!(addr.local(), "amara");
//! assert_eq!(addr.domain(), "example.sl");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for address parsing
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid address format: expected 'local@domain', got '{0}'")]
    InvalidFormat(String),

    #[error("address local part cannot be empty")]
    EmptyLocal,

    #[error("address domain cannot be empty")]
    EmptyDomain,

    #[error("address contains whitespace or control characters: '{0}'")]
    InvalidCharacters(String),

    #[error("address domain has no dot: '{0}'")]
    BareDomain(String),
}

/// A validated email address
///
/// Validation is deliberately conservative: one '@', non-empty local part,
/// a dotted domain, no whitespace or control characters. Anything stricter
/// belongs to the mail provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EmailAddress {
    local: String,
    domain: String,
}

impl EmailAddress {
    /// Parse and validate an address
    ///
    /// # Errors
    /// Returns an error if the address is structurally invalid.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, AddressError> {
        let raw = raw.as_ref().trim();

        if raw.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(AddressError::InvalidCharacters(raw.to_string()));
        }

        let (local, domain) = raw
            .split_once('@')
            .ok_or_else(|| AddressError::InvalidFormat(raw.to_string()))?;

        if domain.contains('@') {
            return Err(AddressError::InvalidFormat(raw.to_string()));
        }
        if local.is_empty() {
            return Err(AddressError::EmptyLocal);
        }
        if domain.is_empty() {
            return Err(AddressError::EmptyDomain);
        }
        if !domain.contains('.') {
            return Err(AddressError::BareDomain(raw.to_string()));
        }

        Ok(Self {
            local: local.to_string(),
            domain: domain.to_string(),
        })
    }

    /// Get the local part (before the '@')
    pub fn local(&self) -> &str {
        &self.local
    }

    /// Get the domain part (after the '@')
    pub fn domain(&self) -> &str {
        &self.domain
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)
    }
}

impl FromStr for EmailAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for EmailAddress {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EmailAddress> for String {
    fn from(addr: EmailAddress) -> Self {
        addr.to_string()
    }
}
