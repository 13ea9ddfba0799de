//! # In-Memory Broker
//!
//! Thread-safe in-memory implementation of [`MessageBroker`] for tests and
//! development: a routing table per exchange plus per-queue FIFO storage
//! with visibility-timeout simulation.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::messaging::envelope::MessageHeaders;
use crate::messaging::errors::MessagingError;
use crate::messaging::service::traits::MessageBroker;
use crate::messaging::service::types::{Delivery, QueueStats, ReceiptHandle, Topology};

#[derive(Debug, Clone)]
struct StoredMessage {
    id: u64,
    headers: HashMap<String, String>,
    correlation_id: Option<String>,
    payload: Vec<u8>,
    enqueued_at: DateTime<Utc>,
    /// When the message becomes visible again (None = visible now).
    visible_at: Option<DateTime<Utc>>,
    receive_count: u32,
}

#[derive(Debug, Default)]
struct InMemoryQueue {
    messages: VecDeque<StoredMessage>,
    dead_lettered: Vec<StoredMessage>,
    next_id: u64,
}

#[derive(Debug, Default)]
struct BrokerState {
    /// exchange -> (routing key, queue) bindings. A `#` routing key matches
    /// every publish on the exchange.
    bindings: HashMap<String, Vec<(String, String)>>,
    queues: HashMap<String, InMemoryQueue>,
}

/// In-memory broker for tests.
///
/// Publishes route through declared bindings exactly like the topic topology
/// on the real broker; unroutable messages are dropped, matching AMQP
/// semantics for unbound routing keys.
#[derive(Debug, Default)]
pub struct InMemoryBroker {
    state: RwLock<BrokerState>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A broker with the contractual topology already declared.
    pub async fn with_standard_topology() -> Self {
        let broker = Self::new();
        broker
            .declare_topology(&Topology::standard())
            .await
            .expect("in-memory topology declaration is infallible");
        broker
    }

    /// Number of messages currently stored on a queue (visible or not).
    pub async fn queue_length(&self, queue_name: &str) -> usize {
        let state = self.state.read().await;
        state
            .queues
            .get(queue_name)
            .map(|q| q.messages.len())
            .unwrap_or(0)
    }

    /// Number of messages handed to the dead-letter policy of a queue.
    pub async fn dead_letter_count(&self, queue_name: &str) -> usize {
        let state = self.state.read().await;
        state
            .queues
            .get(queue_name)
            .map(|q| q.dead_lettered.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn declare_topology(&self, topology: &Topology) -> Result<(), MessagingError> {
        let mut state = self.state.write().await;
        for exchange in &topology.exchanges {
            state.bindings.entry(exchange.to_string()).or_default();
        }
        for binding in &topology.bindings {
            state
                .queues
                .entry(binding.queue.to_string())
                .or_default();
            let entries = state
                .bindings
                .entry(binding.exchange.to_string())
                .or_default();
            let entry = (binding.routing_key.to_string(), binding.queue.to_string());
            if !entries.contains(&entry) {
                entries.push(entry);
            }
        }
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        headers: &MessageHeaders,
        payload: &[u8],
    ) -> Result<(), MessagingError> {
        let wire_headers = headers.to_wire_map();
        let correlation_id = headers.correlation_id().map(|id| id.to_string());
        let now = Utc::now();

        let mut state = self.state.write().await;
        let targets: Vec<String> = state
            .bindings
            .get(exchange)
            .ok_or_else(|| MessagingError::exchange_operation(exchange, "unknown exchange"))?
            .iter()
            .filter(|(pattern, _)| pattern == "#" || pattern == routing_key)
            .map(|(_, queue)| queue.clone())
            .collect();

        for queue_name in targets {
            let queue = state.queues.entry(queue_name).or_default();
            queue.next_id += 1;
            queue.messages.push_back(StoredMessage {
                id: queue.next_id,
                headers: wire_headers.clone(),
                correlation_id: correlation_id.clone(),
                payload: payload.to_vec(),
                enqueued_at: now,
                visible_at: None,
                receive_count: 0,
            });
        }
        Ok(())
    }

    async fn receive(
        &self,
        queue_name: &str,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<Delivery>, MessagingError> {
        let mut state = self.state.write().await;
        let queue = state
            .queues
            .get_mut(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;

        let now = Utc::now();
        let invisible_until = now
            + chrono::Duration::from_std(visibility_timeout)
                .map_err(|e| MessagingError::internal(e.to_string()))?;
        let mut received = Vec::new();

        for msg in queue.messages.iter_mut() {
            if received.len() >= max_messages {
                break;
            }
            let is_visible = msg.visible_at.map(|at| at <= now).unwrap_or(true);
            if is_visible {
                msg.visible_at = Some(invisible_until);
                msg.receive_count += 1;
                received.push(Delivery {
                    receipt_handle: ReceiptHandle::from(msg.id),
                    headers: msg.headers.clone(),
                    correlation_id: msg.correlation_id.clone(),
                    payload: msg.payload.clone(),
                    redelivered: msg.receive_count > 1,
                    enqueued_at: msg.enqueued_at,
                });
            }
        }
        Ok(received)
    }

    async fn ack(
        &self,
        queue_name: &str,
        receipt_handle: &ReceiptHandle,
    ) -> Result<(), MessagingError> {
        let id: u64 = receipt_handle
            .as_str()
            .parse()
            .map_err(|_| MessagingError::invalid_receipt_handle(receipt_handle.as_str()))?;

        let mut state = self.state.write().await;
        let queue = state
            .queues
            .get_mut(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;

        match queue.messages.iter().position(|m| m.id == id) {
            Some(pos) => {
                queue.messages.remove(pos);
                Ok(())
            }
            None => Err(MessagingError::message_not_found(id.to_string())),
        }
    }

    async fn nack(
        &self,
        queue_name: &str,
        receipt_handle: &ReceiptHandle,
        requeue: bool,
    ) -> Result<(), MessagingError> {
        let id: u64 = receipt_handle
            .as_str()
            .parse()
            .map_err(|_| MessagingError::invalid_receipt_handle(receipt_handle.as_str()))?;

        let mut state = self.state.write().await;
        let queue = state
            .queues
            .get_mut(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;

        if requeue {
            match queue.messages.iter_mut().find(|m| m.id == id) {
                Some(msg) => {
                    msg.visible_at = None;
                    Ok(())
                }
                None => Err(MessagingError::message_not_found(id.to_string())),
            }
        } else {
            match queue.messages.iter().position(|m| m.id == id) {
                Some(pos) => {
                    let msg = queue.messages.remove(pos).expect("position just found");
                    queue.dead_lettered.push(msg);
                    Ok(())
                }
                None => Err(MessagingError::message_not_found(id.to_string())),
            }
        }
    }

    async fn queue_stats(&self, queue_name: &str) -> Result<QueueStats, MessagingError> {
        let state = self.state.read().await;
        let queue = state
            .queues
            .get(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;
        Ok(QueueStats::new(queue_name, queue.messages.len() as u64))
    }

    async fn health_check(&self) -> Result<bool, MessagingError> {
        Ok(true)
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}
