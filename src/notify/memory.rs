//! In-memory mail transport
//!
//! Captures outbound mail instead of transmitting it. Used by tests and by
//! deployments that want the lifecycle without a mail server (captured mail
//! can be inspected or dropped).

use super::transport::{MailTransport, OutboundMail, TransportError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Transport double that records instead of sending
#[derive(Debug, Default)]
pub struct MemoryTransport {
    sent: Mutex<Vec<OutboundMail>>,
    scripted_failures: Mutex<VecDeque<TransportError>>,
    reject_auth: AtomicBool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages delivered so far
    pub fn sent(&self) -> Vec<OutboundMail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// Queue an error to be returned instead of the next delivery
    pub fn fail_next(&self, error: TransportError) {
        self.scripted_failures.lock().unwrap().push_back(error);
    }

    /// Queue `n` unreachable-server failures
    pub fn fail_unreachable(&self, n: usize) {
        let mut failures = self.scripted_failures.lock().unwrap();
        for _ in 0..n {
            failures.push_back(TransportError::Unreachable("scripted failure".into()));
        }
    }

    /// Reject every delivery as a credential failure
    pub fn reject_auth(&self) {
        self.reject_auth.store(true, Ordering::Relaxed);
    }
}

#[async_trait]
impl MailTransport for MemoryTransport {
    async fn deliver(&self, mail: &OutboundMail) -> Result<(), TransportError> {
        if self.reject_auth.load(Ordering::Relaxed) {
            return Err(TransportError::AuthRejected(
                "535 5.7.8 username and password not accepted".into(),
            ));
        }
        if let Some(error) = self.scripted_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
