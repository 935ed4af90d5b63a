//! Delivery channel collaborator
//!
//! The channel-agnostic seam dispatch queue workers deliver through. In
//! this system it is instantiated as an outbound SMTP transport
//! ([`SmtpChannel`](crate::service::SmtpChannel)), but nothing in the
//! queue knows or cares.

use async_trait::async_trait;

use crate::Result;

/// One asynchronous delivery side effect against an external channel
///
/// A failed send maps to
/// [`Error::DeliveryAttemptFailed`](crate::Error::DeliveryAttemptFailed)
/// and follows the queue's retry policy.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    async fn send(&self, address: &str, subject: &str, body: &str) -> Result<()>;
}
