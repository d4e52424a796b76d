//! Mail transport abstraction
//!
//! Defines the trait for pluggable mail delivery backends and the error
//! taxonomy the dispatcher's retry logic is driven by. The operator-facing
//! distinction the errors must preserve: a rejected credential (fix the
//! configuration, e.g. Gmail requires an app-specific password) versus an
//! unreachable server (transient, retry).

use super::EmailAddress;
use crate::retry::{RetryDecision, RetryableError};
use async_trait::async_trait;
use thiserror::Error;

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// The server rejected the configured credentials. Never retried;
    /// disables the notification path until an operator intervenes.
    #[error("credentials rejected by mail server: {0}")]
    AuthRejected(String),

    /// The server could not be reached (DNS, connect, reset)
    #[error("mail server unreachable: {0}")]
    Unreachable(String),

    /// The session exceeded the configured timeout
    #[error("mail transport timed out")]
    Timeout,

    /// Server signalled a transient condition (4xx reply)
    #[error("transient server failure ({code}): {message}")]
    Transient { code: u16, message: String },

    /// Server permanently rejected the message (5xx reply)
    #[error("message rejected ({code}): {message}")]
    Rejected { code: u16, message: String },

    /// TLS negotiation failed
    #[error("tls error: {0}")]
    Tls(String),

    /// The server's replies violated the protocol
    #[error("protocol error: {0}")]
    Protocol(String),

    /// I/O failure mid-session
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl RetryableError for TransportError {
    fn retry_decision(&self) -> RetryDecision {
        match self {
            // Transient: the next attempt may land on a healthy server
            TransportError::Unreachable(_)
            | TransportError::Timeout
            | TransportError::Transient { .. }
            | TransportError::Io(_) => RetryDecision::Retry,

            // Permanent: retrying cannot change the outcome
            TransportError::AuthRejected(_)
            | TransportError::Rejected { .. }
            | TransportError::Tls(_)
            | TransportError::Protocol(_) => RetryDecision::NoRetry,
        }
    }
}

/// A rendered message addressed and ready to transmit
#[derive(Debug, Clone)]
pub struct OutboundMail {
    pub from: EmailAddress,
    pub to: EmailAddress,
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// Trait for mail delivery backends
///
/// Implementations open whatever connection they need inside `deliver` and
/// release it on every exit path; the dispatcher never holds a transport
/// connection across calls.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Transmit exactly one message
    async fn deliver(&self, mail: &OutboundMail) -> Result<(), TransportError>;

    /// Short backend name for logging
    fn name(&self) -> &'static str {
        "mail"
    }
}
