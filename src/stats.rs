//! # Queue Statistics Probe
//!
//! Read-only view into broker queue depths for operator consumption.
//! Best-effort against the broker's management surface; no caching.

use std::sync::Arc;

use crate::errors::ClientResult;
use crate::messaging::MessageBroker;

#[derive(Clone)]
pub struct QueueStatsService {
    broker: Arc<dyn MessageBroker>,
}

impl QueueStatsService {
    pub fn new(broker: Arc<dyn MessageBroker>) -> Self {
        Self { broker }
    }

    /// Number of messages currently on `queue_name`.
    pub async fn get_queue_count(&self, queue_name: &str) -> ClientResult<u64> {
        let stats = self.broker.queue_stats(queue_name).await?;
        Ok(stats.message_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{exchanges, queues, topics};
    use crate::messaging::envelope::MessageHeaders;
    use crate::messaging::service::providers::InMemoryBroker;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_queue_count_tracks_publishes() {
        let broker = Arc::new(InMemoryBroker::with_standard_topology().await);
        let stats = QueueStatsService::new(broker.clone());

        assert_eq!(
            stats
                .get_queue_count(queues::PERSONDATA_PARTIAL_INCOMING)
                .await
                .unwrap(),
            0
        );

        for _ in 0..3 {
            broker
                .publish(
                    exchanges::LWGS,
                    topics::PERSONDATA_PARTIAL_INCOMING,
                    &MessageHeaders::builder().transaction_id(Uuid::new_v4()).build(),
                    b"{}",
                )
                .await
                .unwrap();
        }

        assert_eq!(
            stats
                .get_queue_count(queues::PERSONDATA_PARTIAL_INCOMING)
                .await
                .unwrap(),
            3
        );
    }
}
