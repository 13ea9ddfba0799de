//! # Queue Consumer
//!
//! Polling-based consumer driving a [`DeliveryHandler`] with bounded
//! concurrency.
//!
//! - **Polling loop**: `tokio::time::interval` against the broker's pull API
//! - **Backpressure**: semaphore-bounded concurrent handling per queue
//! - **Ack policy**: success acks; `SyncJobNotFound` rejects to the broker's
//!   dead-letter policy; any other handler error nacks with requeue so the
//!   broker may redeliver
//! - **Observability**: atomic counters exposed through [`ConsumerStats`]
//!
//! Broker acknowledgement happens only after the handler returns, so a
//! crashed worker leaves the message for redelivery.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::config::ConsumerSettings;
use crate::errors::{ClientError, ClientResult};
use crate::messaging::envelope::MessageHeaders;
use crate::messaging::service::types::Delivery;
use crate::messaging::MessageBroker;

/// A message handler fed by the consumer. Handlers dispatch on the parsed
/// header envelope; payloads of state messages are empty by contract.
#[async_trait]
pub trait DeliveryHandler: Send + Sync + 'static {
    async fn handle(&self, headers: &MessageHeaders) -> ClientResult<()>;
}

/// Counters for consumer observability.
#[derive(Debug, Default)]
pub struct ConsumerStats {
    pub polling_cycles: AtomicU64,
    pub messages_processed: AtomicU64,
    pub messages_requeued: AtomicU64,
    pub messages_dead_lettered: AtomicU64,
}

impl ConsumerStats {
    pub fn get_messages_processed(&self) -> u64 {
        self.messages_processed.load(Ordering::Relaxed)
    }

    pub fn get_messages_requeued(&self) -> u64 {
        self.messages_requeued.load(Ordering::Relaxed)
    }

    pub fn get_messages_dead_lettered(&self) -> u64 {
        self.messages_dead_lettered.load(Ordering::Relaxed)
    }
}

/// Long-lived polling consumer for one queue.
pub struct QueueConsumer {
    broker: Arc<dyn MessageBroker>,
    handler: Arc<dyn DeliveryHandler>,
    queue_name: &'static str,
    settings: ConsumerSettings,
    running: Arc<AtomicBool>,
    workers: Arc<Semaphore>,
    stats: Arc<ConsumerStats>,
}

impl QueueConsumer {
    pub fn new(
        broker: Arc<dyn MessageBroker>,
        handler: Arc<dyn DeliveryHandler>,
        queue_name: &'static str,
        settings: ConsumerSettings,
    ) -> Self {
        let workers = Arc::new(Semaphore::new(settings.max_concurrent_workers));
        Self {
            broker,
            handler,
            queue_name,
            settings,
            running: Arc::new(AtomicBool::new(false)),
            workers,
            stats: Arc::new(ConsumerStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<ConsumerStats> {
        self.stats.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the background polling loop.
    pub fn start(self: Arc<Self>) {
        info!(
            queue = self.queue_name,
            workers = self.settings.max_concurrent_workers,
            batch_size = self.settings.batch_size,
            "Starting queue consumer"
        );
        self.running.store(true, Ordering::SeqCst);

        tokio::spawn(async move {
            self.polling_loop().await;
        });
    }

    /// Stop polling and drain in-flight handlers before returning.
    pub async fn stop(&self) {
        info!(queue = self.queue_name, "Stopping queue consumer");
        self.running.store(false, Ordering::SeqCst);

        // Waiting for every permit means every spawned handler finished.
        let _drain = self
            .workers
            .acquire_many(self.settings.max_concurrent_workers as u32)
            .await;

        info!(queue = self.queue_name, "Queue consumer stopped");
    }

    async fn polling_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.settings.poll_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        while self.running.load(Ordering::SeqCst) {
            interval.tick().await;
            self.stats.polling_cycles.fetch_add(1, Ordering::Relaxed);

            if let Err(e) = Arc::clone(&self).poll_once().await {
                warn!(queue = self.queue_name, error = %e, "Poll iteration failed");
            }
        }

        debug!(queue = self.queue_name, "Polling loop exited");
    }

    async fn poll_once(self: Arc<Self>) -> ClientResult<()> {
        let deliveries = self
            .broker
            .receive(
                self.queue_name,
                self.settings.batch_size,
                self.settings.visibility_timeout(),
            )
            .await?;

        let mut handles = Vec::with_capacity(deliveries.len());
        for delivery in deliveries {
            let permit = self
                .workers
                .clone()
                .acquire_owned()
                .await
                .expect("consumer semaphore is never closed");

            let consumer = Arc::clone(&self);
            handles.push(tokio::spawn(async move {
                consumer.process_delivery(delivery).await;
                drop(permit);
            }));
        }
        join_all(handles).await;

        Ok(())
    }

    async fn process_delivery(&self, delivery: Delivery) {
        let headers = MessageHeaders::from_wire_map(&delivery.headers);

        match self.handler.handle(&headers).await {
            Ok(()) => {
                self.stats.messages_processed.fetch_add(1, Ordering::Relaxed);
                if let Err(e) = self.broker.ack(self.queue_name, &delivery.receipt_handle).await {
                    error!(queue = self.queue_name, error = %e, "Failed to ack message");
                }
            }
            Err(ClientError::SyncJobNotFound { job_id }) => {
                warn!(
                    queue = self.queue_name,
                    ?job_id,
                    correlation_id = ?delivery.correlation_id,
                    "Rejecting unreconcilable message toward dead-letter policy"
                );
                self.stats
                    .messages_dead_lettered
                    .fetch_add(1, Ordering::Relaxed);
                if let Err(e) = self
                    .broker
                    .nack(self.queue_name, &delivery.receipt_handle, false)
                    .await
                {
                    error!(queue = self.queue_name, error = %e, "Failed to reject message");
                }
            }
            Err(e) => {
                error!(
                    queue = self.queue_name,
                    error = %e,
                    correlation_id = ?delivery.correlation_id,
                    "Handler failed, returning message for redelivery"
                );
                self.stats.messages_requeued.fetch_add(1, Ordering::Relaxed);
                if let Err(e) = self
                    .broker
                    .nack(self.queue_name, &delivery.receipt_handle, true)
                    .await
                {
                    error!(queue = self.queue_name, error = %e, "Failed to nack message");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{exchanges, queues, topics};
    use crate::messaging::service::providers::InMemoryBroker;
    use std::time::Duration;
    use uuid::Uuid;

    #[derive(Default)]
    struct RecordingHandler {
        handled: AtomicU64,
        fail_unknown_jobs: bool,
    }

    #[async_trait]
    impl DeliveryHandler for RecordingHandler {
        async fn handle(&self, headers: &MessageHeaders) -> ClientResult<()> {
            if self.fail_unknown_jobs && headers.job_id.is_none() {
                return Err(ClientError::SyncJobNotFound { job_id: None });
            }
            self.handled.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached within timeout");
    }

    fn settings() -> ConsumerSettings {
        ConsumerSettings {
            max_concurrent_workers: 4,
            batch_size: 10,
            poll_interval_ms: 10,
            visibility_timeout_seconds: 30,
        }
    }

    #[tokio::test]
    async fn test_consumer_processes_and_acks() {
        let broker = Arc::new(InMemoryBroker::with_standard_topology().await);
        let handler = Arc::new(RecordingHandler::default());
        let consumer = Arc::new(QueueConsumer::new(
            broker.clone(),
            handler.clone(),
            queues::TRANSACTION_STATE,
            settings(),
        ));

        for _ in 0..3 {
            broker
                .publish(
                    exchanges::LWGS_STATE,
                    topics::TRANSACTION_STATE,
                    &MessageHeaders::builder().transaction_id(Uuid::new_v4()).build(),
                    b"",
                )
                .await
                .unwrap();
        }

        consumer.clone().start();
        let stats = consumer.stats();
        wait_until(|| stats.get_messages_processed() == 3).await;
        consumer.stop().await;

        assert_eq!(handler.handled.load(Ordering::Relaxed), 3);
        assert_eq!(broker.queue_length(queues::TRANSACTION_STATE).await, 0);
    }

    #[tokio::test]
    async fn test_sync_job_not_found_is_dead_lettered() {
        let broker = Arc::new(InMemoryBroker::with_standard_topology().await);
        let handler = Arc::new(RecordingHandler {
            fail_unknown_jobs: true,
            ..Default::default()
        });
        let consumer = Arc::new(QueueConsumer::new(
            broker.clone(),
            handler,
            queues::SEDEX_STATE,
            settings(),
        ));

        broker
            .publish(
                exchanges::LWGS_STATE,
                topics::SEDEX_STATE,
                &MessageHeaders::builder().build(),
                b"",
            )
            .await
            .unwrap();

        consumer.clone().start();
        let stats = consumer.stats();
        wait_until(|| stats.get_messages_dead_lettered() == 1).await;
        consumer.stop().await;

        assert_eq!(broker.queue_length(queues::SEDEX_STATE).await, 0);
        assert_eq!(broker.dead_letter_count(queues::SEDEX_STATE).await, 1);
    }
}
