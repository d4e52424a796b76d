//! Notification dispatcher
//!
//! Renders a template, transmits it through the configured transport with
//! bounded retry, and records the attempt in the notification event log.
//!
//! Two rules shape the API:
//! - `send` never returns `Err`. Delivery failure is an outcome, not an
//!   error, because notification failure must never block the business
//!   transition it accompanies.
//! - A credential rejection latches the dispatcher shut. Retrying a bad
//!   password cannot succeed and hammers the provider, so the path stays
//!   disabled until an operator fixes the configuration and resets the
//!   latch.
//!
//! Delivery is at-least-once: a crash between transmission and event
//! recording can lead to a duplicate on the next drive. Templates are
//! idempotent statements of current state, so duplicates are accepted.

use super::template::{Template, TemplateKind};
use super::transport::{MailTransport, OutboundMail, TransportError};
use super::EmailAddress;
use crate::mission::MissionId;
use crate::retry::{with_retry, RetryConfig};
use crate::Result;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Terminal outcome of one dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The transport accepted the message
    Sent { attempts: u32 },
    /// The retry budget was exhausted or the failure was permanent
    Failed { attempts: u32, reason: String },
}

impl DeliveryOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, DeliveryOutcome::Sent { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            DeliveryOutcome::Sent { attempts } => *attempts,
            DeliveryOutcome::Failed { attempts, .. } => *attempts,
        }
    }
}

/// Outcome stored in the notification event log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Sent,
    Failed,
}

impl EventOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventOutcome::Sent => "sent",
            EventOutcome::Failed => "failed",
        }
    }
}

/// A record of one attempted outbound email
#[derive(Debug, Clone)]
pub struct NotificationEvent {
    /// The mission the notification belongs to, if any (broadcasts have none)
    pub mission_id: Option<MissionId>,
    pub recipient: String,
    pub kind: TemplateKind,
    /// The template payload, JSON-serialized
    pub payload: String,
    pub outcome: EventOutcome,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Sink for notification events (implemented by the SQLite store)
pub trait NotificationLog: Send + Sync {
    fn record(&self, event: &NotificationEvent) -> Result<i64>;
}

/// The notification dispatcher
pub struct Dispatcher {
    transport: Arc<dyn MailTransport>,
    log: Option<Arc<dyn NotificationLog>>,
    retry: RetryConfig,
    sender: EmailAddress,
    auth_latched: AtomicBool,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn MailTransport>, sender: EmailAddress) -> Self {
        Self {
            transport,
            log: None,
            retry: RetryConfig::default(),
            sender,
            auth_latched: AtomicBool::new(false),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_log(mut self, log: Arc<dyn NotificationLog>) -> Self {
        self.log = Some(log);
        self
    }

    /// True once a credential rejection disabled the notification path
    pub fn auth_latched(&self) -> bool {
        self.auth_latched.load(Ordering::Relaxed)
    }

    /// Re-enable dispatch after the operator corrected the credentials
    pub fn reset_auth_latch(&self) {
        self.auth_latched.store(false, Ordering::Relaxed);
        info!("Notification path re-enabled");
    }

    /// Dispatch one notification. Exactly one outbound message per call on
    /// success; callers must not call twice for the same logical event.
    pub async fn send(
        &self,
        mission_id: Option<MissionId>,
        to: &EmailAddress,
        template: &Template,
    ) -> DeliveryOutcome {
        let kind = template.kind();

        if self.auth_latched() {
            warn!(
                recipient = %to,
                template = %kind,
                "Notification path disabled after credential rejection; dropping message"
            );
            let outcome = DeliveryOutcome::Failed {
                attempts: 0,
                reason: "notification path disabled after credential rejection".into(),
            };
            self.record(mission_id, to, template, &outcome);
            return outcome;
        }

        let rendered = template.render();
        let mail = OutboundMail {
            from: self.sender.clone(),
            to: to.clone(),
            subject: rendered.subject,
            text: rendered.text,
            html: rendered.html,
        };

        let mut attempts = 0u32;
        let result = with_retry(&self.retry, "notification delivery", || {
            attempts += 1;
            let transport = Arc::clone(&self.transport);
            let mail = mail.clone();
            async move { transport.deliver(&mail).await }
        })
        .await;

        let outcome = match result {
            Ok(()) => {
                info!(
                    recipient = %to,
                    template = %kind,
                    attempts = attempts,
                    transport = self.transport.name(),
                    "Notification sent"
                );
                DeliveryOutcome::Sent { attempts }
            }
            Err(e) => {
                if matches!(e, TransportError::AuthRejected(_)) {
                    self.auth_latched.store(true, Ordering::Relaxed);
                    error!(
                        transport = self.transport.name(),
                        "Mail credentials rejected; disabling notification path until reset. \
                         Gmail accounts require an app-specific password: {}",
                        e
                    );
                } else {
                    warn!(
                        recipient = %to,
                        template = %kind,
                        attempts = attempts,
                        "Notification delivery failed: {}",
                        e
                    );
                }
                DeliveryOutcome::Failed {
                    attempts,
                    reason: e.to_string(),
                }
            }
        };

        self.record(mission_id, to, template, &outcome);
        outcome
    }

    /// Fan a template out to a recipient list (maintenance broadcasts)
    pub async fn broadcast(
        &self,
        recipients: &[EmailAddress],
        template: &Template,
    ) -> Vec<DeliveryOutcome> {
        let mut outcomes = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            outcomes.push(self.send(None, recipient, template).await);
        }
        outcomes
    }

    fn record(
        &self,
        mission_id: Option<MissionId>,
        to: &EmailAddress,
        template: &Template,
        outcome: &DeliveryOutcome,
    ) {
        let Some(log) = &self.log else {
            return;
        };

        let (event_outcome, last_error) = match outcome {
            DeliveryOutcome::Sent { .. } => (EventOutcome::Sent, None),
            DeliveryOutcome::Failed { reason, .. } => {
                (EventOutcome::Failed, Some(reason.clone()))
            }
        };
        let event = NotificationEvent {
            mission_id,
            recipient: to.to_string(),
            kind: template.kind(),
            payload: serde_json::to_string(template).unwrap_or_default(),
            outcome: event_outcome,
            attempts: outcome.attempts(),
            last_error,
            created_at: Utc::now(),
        };

        if let Err(e) = log.record(&event) {
            warn!("Failed to record notification event: {}", e);
        }
    }
}
