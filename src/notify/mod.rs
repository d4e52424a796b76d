//! Notification dispatch
//!
//! Transactional email for the mission lifecycle:
//! - **address**: validated recipient/sender addresses
//! - **template**: the four template kinds and their rendering
//! - **transport**: the pluggable delivery seam and its error taxonomy
//! - **smtp**: the production SMTP transport (STARTTLS, AUTH PLAIN)
//! - **memory**: capturing transport for tests and mail-less deployments
//! - **dispatcher**: retry, event recording, and the credential latch

mod address;
mod dispatcher;
mod memory;
mod smtp;
mod template;
mod transport;

pub use address::{AddressError, EmailAddress};
pub use dispatcher::{
    DeliveryOutcome, Dispatcher, EventOutcome, NotificationEvent, NotificationLog,
};
pub use memory::MemoryTransport;
pub use smtp::SmtpTransport;
pub use template::{Rendered, Template, TemplateKind};
pub use transport::{MailTransport, OutboundMail, TransportError};
