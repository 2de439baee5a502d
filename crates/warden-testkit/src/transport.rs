//! Message transport that records instead of delivering

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use warden_core::effects::MessagingTransport;
use warden_core::{Result, WardenError};

/// One recorded delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub phone_number: String,
    pub body: String,
}

#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<SentMessage>>,
    failing: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every message sent so far, oldest first
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    /// Body of the most recent message to `phone_number`
    pub fn last_to(&self, phone_number: &str) -> Option<String> {
        self.sent
            .lock()
            .iter()
            .rev()
            .find(|m| m.phone_number == phone_number)
            .map(|m| m.body.clone())
    }

    /// Make subsequent deliveries fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl MessagingTransport for RecordingTransport {
    async fn send(&self, phone_number: &str, message: &str) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(WardenError::internal(format!(
                "delivery to {phone_number} failed"
            )));
        }
        tracing::debug!(phone = phone_number, "recorded outbound message");
        self.sent.lock().push(SentMessage {
            phone_number: phone_number.to_string(),
            body: message.to_string(),
        });
        Ok(())
    }
}
