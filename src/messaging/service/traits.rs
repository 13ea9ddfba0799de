//! # Broker Trait
//!
//! Provider-agnostic broker operations. The trait is object-safe so
//! components can hold an `Arc<dyn MessageBroker>` and tests can substitute
//! the in-memory provider.

use std::time::Duration;

use async_trait::async_trait;

use super::types::{Delivery, QueueStats, ReceiptHandle, Topology};
use crate::messaging::envelope::MessageHeaders;
use crate::messaging::errors::MessagingError;

/// Core broker operations: declare topology, publish with headers, pull-based
/// receive with visibility timeout, ack/nack, queue statistics.
#[async_trait]
pub trait MessageBroker: Send + Sync + 'static {
    /// Declare exchanges, queues and bindings. Idempotent; safe to call on
    /// every startup.
    async fn declare_topology(&self, topology: &Topology) -> Result<(), MessagingError>;

    /// Publish a payload to an exchange under a routing key.
    ///
    /// The envelope is written onto the message headers and its correlation
    /// id (transaction id, else job id) onto the broker correlation
    /// property. Delivery is broker-confirmed where the provider supports
    /// it.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        headers: &MessageHeaders,
        payload: &[u8],
    ) -> Result<(), MessagingError>;

    /// Receive up to `max_messages` from a queue. Messages stay invisible to
    /// other consumers until acked, nacked or the visibility timeout
    /// elapses.
    async fn receive(
        &self,
        queue_name: &str,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<Delivery>, MessagingError>;

    /// Acknowledge successful processing; removes the message.
    async fn ack(
        &self,
        queue_name: &str,
        receipt_handle: &ReceiptHandle,
    ) -> Result<(), MessagingError>;

    /// Negative acknowledgement. `requeue = true` returns the message to the
    /// queue for redelivery; `requeue = false` hands it to the broker's
    /// dead-letter policy.
    async fn nack(
        &self,
        queue_name: &str,
        receipt_handle: &ReceiptHandle,
        requeue: bool,
    ) -> Result<(), MessagingError>;

    /// Best-effort queue statistics from the broker's management surface.
    async fn queue_stats(&self, queue_name: &str) -> Result<QueueStats, MessagingError>;

    /// Verify the broker is reachable.
    async fn health_check(&self) -> Result<bool, MessagingError>;

    /// Provider name for logging.
    fn provider_name(&self) -> &'static str;
}
