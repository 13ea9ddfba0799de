//! # Broker Service Types
//!
//! Core types for the provider-agnostic broker abstraction.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::constants::{exchanges, queues, topics};

/// Handle for acknowledging a received message.
///
/// The format is provider-specific: RabbitMQ uses the delivery tag, the
/// in-memory provider an internal counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiptHandle(pub String);

impl ReceiptHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ReceiptHandle {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ReceiptHandle {
    fn from(handle: String) -> Self {
        Self(handle)
    }
}

/// A message received from a queue.
///
/// Headers stay as the untyped wire map here; consumers parse them once into
/// [`crate::messaging::MessageHeaders`].
#[derive(Debug, Clone)]
pub struct Delivery {
    pub receipt_handle: ReceiptHandle,
    pub headers: HashMap<String, String>,
    pub correlation_id: Option<String>,
    pub payload: Vec<u8>,
    pub redelivered: bool,
    pub enqueued_at: DateTime<Utc>,
}

/// Queue statistics snapshot for operator consumption. Best-effort; no
/// caching guarantees.
#[derive(Debug, Clone)]
pub struct QueueStats {
    pub queue_name: String,
    pub message_count: u64,
    pub consumer_count: Option<u64>,
}

impl QueueStats {
    pub fn new(queue_name: impl Into<String>, message_count: u64) -> Self {
        Self {
            queue_name: queue_name.into(),
            message_count,
            consumer_count: None,
        }
    }

    pub fn with_consumer_count(mut self, count: u64) -> Self {
        self.consumer_count = Some(count);
        self
    }
}

/// A queue bound to an exchange under a routing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueBinding {
    pub queue: &'static str,
    pub exchange: &'static str,
    pub routing_key: &'static str,
}

/// Declarative broker topology: topic exchanges, queues and their bindings.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    pub exchanges: Vec<&'static str>,
    pub bindings: Vec<QueueBinding>,
}

impl Topology {
    /// Queue names in declaration order, deduplicated.
    pub fn queue_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        for binding in &self.bindings {
            if !names.contains(&binding.queue) {
                names.push(binding.queue);
            }
        }
        names
    }

    /// The contractual topology of the sync client.
    ///
    /// Record payloads route over `lwgs` to their own queue; state shadows
    /// route over `lwgs-state`, where the `transaction-state` queue collects
    /// every record topic and its own, and `sedex-state` collects the Sedex
    /// adapter's events.
    pub fn standard() -> Self {
        let record_bindings = [
            (queues::PERSONDATA_PARTIAL_INCOMING, topics::PERSONDATA_PARTIAL_INCOMING),
            (queues::PERSONDATA_PARTIAL_OUTGOING, topics::PERSONDATA_PARTIAL_OUTGOING),
            (queues::PERSONDATA_PARTIAL_FAILED, topics::PERSONDATA_PARTIAL_FAILED),
            (queues::PERSONDATA_FULL_INCOMING, topics::PERSONDATA_FULL_INCOMING),
            (queues::PERSONDATA_FULL_OUTGOING, topics::PERSONDATA_FULL_OUTGOING),
            (queues::PERSONDATA_FULL_FAILED, topics::PERSONDATA_FULL_FAILED),
            (queues::SEDEX_OUTGOING, topics::SEDEX_OUTGOING),
        ];

        let mut bindings: Vec<QueueBinding> = record_bindings
            .iter()
            .map(|&(queue, routing_key)| QueueBinding {
                queue,
                exchange: exchanges::LWGS,
                routing_key,
            })
            .collect();

        // The transaction-state queue collects the state shadow of every
        // record topic plus events published under its own topic.
        for (_, routing_key) in record_bindings {
            bindings.push(QueueBinding {
                queue: queues::TRANSACTION_STATE,
                exchange: exchanges::LWGS_STATE,
                routing_key,
            });
        }
        bindings.push(QueueBinding {
            queue: queues::TRANSACTION_STATE,
            exchange: exchanges::LWGS_STATE,
            routing_key: topics::TRANSACTION_STATE,
        });
        bindings.push(QueueBinding {
            queue: queues::SEDEX_STATE,
            exchange: exchanges::LWGS_STATE,
            routing_key: topics::SEDEX_STATE,
        });

        Self {
            exchanges: vec![exchanges::LWGS, exchanges::LWGS_STATE],
            bindings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_topology_contains_all_contractual_queues() {
        let topology = Topology::standard();
        let names = topology.queue_names();
        for queue in [
            "persondata-partial-incoming",
            "persondata-partial-outgoing",
            "persondata-partial-failed",
            "persondata-full-incoming",
            "persondata-full-outgoing",
            "persondata-full-failed",
            "transaction-state",
            "sedex-state",
            "sedex-outgoing",
        ] {
            assert!(names.contains(&queue), "missing queue {queue}");
        }
        assert_eq!(topology.exchanges, vec!["lwgs", "lwgs-state"]);
    }

    #[test]
    fn test_state_shadows_of_record_topics_reach_transaction_state() {
        let topology = Topology::standard();
        let binding = topology
            .bindings
            .iter()
            .find(|b| {
                b.exchange == "lwgs-state"
                    && b.queue == "transaction-state"
                    && b.routing_key == "persondata-partial-incoming"
            });
        assert!(binding.is_some());
    }
}
