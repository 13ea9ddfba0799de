//! # Job Seeder
//!
//! Admission of single person-data records into the pipeline. For every
//! accepted record the seeder publishes the payload on the `lwgs` exchange
//! and an empty state shadow on `lwgs-state`, both under the same topic and
//! correlation id, so state-only consumers never read record payloads.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, instrument};
use uuid::Uuid;

use crate::config::SedexConfig;
use crate::constants::{exchanges, queues, topics};
use crate::errors::{ClientError, ClientResult};
use crate::messaging::envelope::{MessageCategory, MessageHeaders};
use crate::messaging::MessageBroker;
use crate::models::types::{JobType, TransactionState};
use crate::models::PersonData;
use crate::stats::QueueStatsService;
use crate::sync::FullSyncStateManager;

const EMPTY_PAYLOAD: &[u8] = b"";

/// Admission service for partial and full seeding.
pub struct JobSeedService {
    broker: Arc<dyn MessageBroker>,
    queue_stats: QueueStatsService,
    full_sync_state_manager: Arc<FullSyncStateManager>,
    is_in_multi_sender_mode: bool,
    single_sender_id: Option<String>,
    valid_sender_ids: HashSet<String>,
}

impl JobSeedService {
    pub fn new(
        broker: Arc<dyn MessageBroker>,
        queue_stats: QueueStatsService,
        full_sync_state_manager: Arc<FullSyncStateManager>,
        configuration: &SedexConfig,
    ) -> Self {
        Self {
            broker,
            queue_stats,
            full_sync_state_manager,
            is_in_multi_sender_mode: configuration.multi_sender,
            single_sender_id: configuration.sender_id.clone(),
            valid_sender_ids: configuration.valid_sender_ids(),
        }
    }

    /// Admit a record in streaming mode. Returns the generated transaction
    /// id.
    #[instrument(skip(self, payload))]
    pub async fn seed_to_partial(
        &self,
        payload: String,
        sender_id: Option<&str>,
    ) -> ClientResult<Uuid> {
        let sender_id = self.validate_or_default_sender_id(sender_id)?;
        self.seed_to_topic(
            payload,
            topics::PERSONDATA_PARTIAL_INCOMING,
            JobType::Partial,
            None,
            sender_id,
        )
        .await
    }

    /// Admit a record under the current full-sync job. Returns `None`
    /// without publishing when admission is closed (the full-sync lifecycle
    /// is not in SEEDING).
    #[instrument(skip(self, payload))]
    pub async fn seed_to_full(
        &self,
        payload: String,
        sender_id: Option<&str>,
    ) -> ClientResult<Option<Uuid>> {
        if !self.full_sync_state_manager.is_in_state_seeding().await {
            debug!("Full sync admission is closed, dropping seed request");
            return Ok(None);
        }

        let sender_id = self.validate_or_default_sender_id(sender_id)?;
        let job_id = self.full_sync_state_manager.current_full_sync_job_id().await;

        let transaction_id = self
            .seed_to_topic(
                payload,
                topics::PERSONDATA_FULL_INCOMING,
                JobType::Full,
                job_id,
                sender_id,
            )
            .await?;

        self.full_sync_state_manager
            .inc_full_seed_message_counter()
            .await?;

        Ok(Some(transaction_id))
    }

    /// Resolve and validate the sender identity. In single-sender mode a
    /// missing id defaults to the configured one; any explicit id must be a
    /// member of the valid set.
    fn validate_or_default_sender_id(&self, sender_id: Option<&str>) -> ClientResult<String> {
        if !self.is_in_multi_sender_mode && sender_id.is_none() {
            if let Some(single) = &self.single_sender_id {
                return Ok(single.clone());
            }
        }
        if let Some(sender_id) = sender_id {
            if self.valid_sender_ids.contains(sender_id) {
                return Ok(sender_id.to_string());
            }
        }
        Err(ClientError::SenderIdValidation {
            given: sender_id.map(str::to_string),
            valid: self.valid_sender_ids.iter().cloned().collect(),
        })
    }

    async fn seed_to_topic(
        &self,
        payload: String,
        topic: &str,
        job_type: JobType,
        job_id: Option<Uuid>,
        sender_id: String,
    ) -> ClientResult<Uuid> {
        let transaction_id = Uuid::new_v4();
        let headers = MessageHeaders::builder()
            .sender_id(sender_id)
            .job_type(job_type)
            .optional_job_id(job_id)
            .message_category(MessageCategory::TransactionEvent)
            .transaction_state(TransactionState::New)
            .transaction_id(transaction_id)
            .build();

        let record = PersonData::new(transaction_id, payload);
        let body = serde_json::to_vec(&record)?;

        // The two publishes are not atomic; the state shadow is idempotent
        // downstream because NEW is an upsert for the consumer.
        self.broker
            .publish(exchanges::LWGS, topic, &headers, &body)
            .await?;
        self.broker
            .publish(exchanges::LWGS_STATE, topic, &headers, EMPTY_PAYLOAD)
            .await?;

        debug!(%transaction_id, topic, "Record seeded");
        Ok(transaction_id)
    }

    pub async fn get_partial_queued(&self) -> ClientResult<u64> {
        self.queue_stats
            .get_queue_count(queues::PERSONDATA_PARTIAL_INCOMING)
            .await
    }

    pub async fn get_partial_processed(&self) -> ClientResult<u64> {
        self.queue_stats
            .get_queue_count(queues::PERSONDATA_PARTIAL_OUTGOING)
            .await
    }

    pub async fn get_partial_failed(&self) -> ClientResult<u64> {
        self.queue_stats
            .get_queue_count(queues::PERSONDATA_PARTIAL_FAILED)
            .await
    }

    pub async fn get_full_queued(&self) -> ClientResult<u64> {
        self.queue_stats
            .get_queue_count(queues::PERSONDATA_FULL_INCOMING)
            .await
    }

    pub async fn get_full_processed(&self) -> ClientResult<u64> {
        self.queue_stats
            .get_queue_count(queues::PERSONDATA_FULL_OUTGOING)
            .await
    }

    pub async fn get_full_failed(&self) -> ClientResult<u64> {
        self.queue_stats
            .get_queue_count(queues::PERSONDATA_FULL_FAILED)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::service::providers::InMemoryBroker;
    use crate::repository::InMemoryRepositories;
    use std::time::Duration;

    async fn service_with(config: SedexConfig) -> (Arc<InMemoryBroker>, Arc<FullSyncStateManager>, JobSeedService) {
        let broker = Arc::new(InMemoryBroker::with_standard_topology().await);
        let repos = InMemoryRepositories::new();
        let manager = Arc::new(FullSyncStateManager::restore(repos).await.unwrap());
        let service = JobSeedService::new(
            broker.clone(),
            QueueStatsService::new(broker.clone()),
            manager.clone(),
            &config,
        );
        (broker, manager, service)
    }

    #[tokio::test]
    async fn test_partial_seed_publishes_record_and_state_shadow() {
        let (broker, _, service) = service_with(SedexConfig::single("S1")).await;

        let transaction_id = service
            .seed_to_partial("hello".to_string(), None)
            .await
            .unwrap();

        let records = broker
            .receive(queues::PERSONDATA_PARTIAL_INCOMING, 10, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        let record: PersonData = serde_json::from_slice(&records[0].payload).unwrap();
        assert_eq!(record.transaction_id, transaction_id);
        assert_eq!(record.payload, "hello");

        let shadows = broker
            .receive(queues::TRANSACTION_STATE, 10, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(shadows.len(), 1);
        assert!(shadows[0].payload.is_empty());
        assert_eq!(shadows[0].correlation_id, records[0].correlation_id);

        let headers = MessageHeaders::from_wire_map(&records[0].headers);
        assert_eq!(headers.sender_id.as_deref(), Some("S1"));
        assert_eq!(headers.job_type, Some(JobType::Partial));
        assert_eq!(headers.job_id, None);
        assert_eq!(headers.transaction_state, Some(TransactionState::New));
        assert_eq!(headers.transaction_id, Some(transaction_id));
    }

    #[tokio::test]
    async fn test_full_seed_is_gated_on_seeding_state() {
        let (broker, _, service) = service_with(SedexConfig::single("S1")).await;

        let result = service
            .seed_to_full("x".to_string(), Some("S1"))
            .await
            .unwrap();
        assert_eq!(result, None);
        assert_eq!(broker.queue_length(queues::PERSONDATA_FULL_INCOMING).await, 0);
        assert_eq!(broker.queue_length(queues::TRANSACTION_STATE).await, 0);
    }

    #[tokio::test]
    async fn test_full_seed_carries_job_id_and_counts() {
        let (broker, manager, service) = service_with(SedexConfig::single("S1")).await;
        let job_id = manager.start_seeding().await.unwrap();

        let transaction_id = service
            .seed_to_full("x".to_string(), Some("S1"))
            .await
            .unwrap()
            .expect("admission is open");

        let records = broker
            .receive(queues::PERSONDATA_FULL_INCOMING, 10, Duration::from_secs(5))
            .await
            .unwrap();
        let headers = MessageHeaders::from_wire_map(&records[0].headers);
        assert_eq!(headers.job_type, Some(JobType::Full));
        assert_eq!(headers.job_id, Some(job_id));
        assert_eq!(headers.transaction_id, Some(transaction_id));
        // Correlation id still prefers the transaction id.
        assert_eq!(
            records[0].correlation_id.as_deref(),
            Some(transaction_id.to_string().as_str())
        );

        assert_eq!(manager.full_seed_message_count().await, 1);
    }

    #[tokio::test]
    async fn test_sender_validation_single_mode() {
        let (_, _, service) = service_with(SedexConfig::single("S1")).await;

        // Null defaults to the configured id.
        assert_eq!(
            service.validate_or_default_sender_id(None).unwrap(),
            "S1"
        );
        // Explicit member of the valid set is accepted.
        assert_eq!(
            service.validate_or_default_sender_id(Some("S1")).unwrap(),
            "S1"
        );
        // Anything else is rejected.
        let err = service
            .validate_or_default_sender_id(Some("X9"))
            .unwrap_err();
        assert!(matches!(err, ClientError::SenderIdValidation { .. }));
    }

    #[tokio::test]
    async fn test_sender_validation_multi_mode() {
        let (_, _, service) = service_with(SedexConfig::multi(vec![
            "S1".to_string(),
            "S2".to_string(),
        ]))
        .await;

        assert_eq!(
            service.validate_or_default_sender_id(Some("S2")).unwrap(),
            "S2"
        );
        // Null is not defaulted in multi-sender mode.
        assert!(service.validate_or_default_sender_id(None).is_err());
        assert!(service.validate_or_default_sender_id(Some("S3")).is_err());
    }

    #[tokio::test]
    async fn test_rejected_sender_publishes_nothing() {
        let (broker, _, service) = service_with(SedexConfig::single("S1")).await;

        let result = service.seed_to_partial("hello".to_string(), Some("X9")).await;
        assert!(result.is_err());
        assert_eq!(
            broker.queue_length(queues::PERSONDATA_PARTIAL_INCOMING).await,
            0
        );
        assert_eq!(broker.queue_length(queues::TRANSACTION_STATE).await, 0);
    }

    #[tokio::test]
    async fn test_queue_depth_accessors() {
        let (_, manager, service) = service_with(SedexConfig::single("S1")).await;
        manager.start_seeding().await.unwrap();

        service.seed_to_partial("a".to_string(), None).await.unwrap();
        service.seed_to_full("b".to_string(), None).await.unwrap();

        assert_eq!(service.get_partial_queued().await.unwrap(), 1);
        assert_eq!(service.get_full_queued().await.unwrap(), 1);
        assert_eq!(service.get_partial_failed().await.unwrap(), 0);
        assert_eq!(service.get_full_processed().await.unwrap(), 0);
    }
}
