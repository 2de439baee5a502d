//! Outbound message delivery (SMS or equivalent)

use crate::Result;
use async_trait::async_trait;

/// Provider-agnostic text message transport
#[async_trait]
pub trait MessagingTransport: Send + Sync {
    /// Deliver `message` to an E.164 phone number
    async fn send(&self, phone_number: &str, message: &str) -> Result<()>;
}
