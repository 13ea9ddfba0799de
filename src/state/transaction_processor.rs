//! # Transaction State Processor
//!
//! Consumer-side owner of Transaction rows and lazy SyncJob creation,
//! driven by the `transaction-state` queue.
//!
//! Dispatch per transaction state:
//!
//! - **NEW** upserts: the row is created from the header; a unique-key clash
//!   means a redelivered NEW whose prior row is authoritative, so the
//!   duplicate is dropped at debug level.
//! - **FAILED** first escalates into the owning FULL job
//!   (FAILED_PROCESSING), then falls through to the default update.
//! - **Everything else** updates an existing row monotonically; events for
//!   transactions whose NEW was never observed are dropped silently and
//!   surfaced through a counter.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use super::consumer::DeliveryHandler;
use crate::errors::ClientResult;
use crate::messaging::envelope::{MessageCategory, MessageHeaders};
use crate::models::types::{JobState, JobType, TransactionState};
use crate::models::{SyncJob, Transaction};
use crate::repository::{SyncJobRepository, TransactionRepository};
use crate::sync::FullSyncStateManager;

/// Counters for processor observability.
#[derive(Debug, Default)]
pub struct TransactionProcessorStats {
    pub transactions_created: AtomicU64,
    pub duplicate_new_dropped: AtomicU64,
    /// Non-NEW events dropped because the transaction was never observed
    /// (NEW lost or reordered away).
    pub unknown_transaction_dropped: AtomicU64,
    pub stale_update_dropped: AtomicU64,
    pub jobs_failed_processing: AtomicU64,
}

impl TransactionProcessorStats {
    pub fn get_unknown_transaction_dropped(&self) -> u64 {
        self.unknown_transaction_dropped.load(Ordering::Relaxed)
    }

    pub fn get_transactions_created(&self) -> u64 {
        self.transactions_created.load(Ordering::Relaxed)
    }

    pub fn get_duplicate_new_dropped(&self) -> u64 {
        self.duplicate_new_dropped.load(Ordering::Relaxed)
    }
}

/// Processor for `transaction-state` events.
pub struct TransactionStateProcessor {
    transactions: Arc<dyn TransactionRepository>,
    sync_jobs: Arc<dyn SyncJobRepository>,
    /// Escalation target for failures of the current full-sync job; absent
    /// when the processor runs outside the admission process.
    full_sync_state_manager: Option<Arc<FullSyncStateManager>>,
    /// Process-local accelerator mapping job id to the observed SyncJob.
    /// Populated only when a row is seen in the repository, never
    /// invalidated; stale entries are harmless because the repository stays
    /// the source of truth and the terminal decision path reloads the row.
    /// The lock also serializes job creation within this process so the
    /// existence check and insert form one step.
    sync_job_cache: Mutex<HashMap<Uuid, SyncJob>>,
    stats: Arc<TransactionProcessorStats>,
}

impl TransactionStateProcessor {
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        sync_jobs: Arc<dyn SyncJobRepository>,
        full_sync_state_manager: Option<Arc<FullSyncStateManager>>,
    ) -> Self {
        Self {
            transactions,
            sync_jobs,
            full_sync_state_manager,
            sync_job_cache: Mutex::new(HashMap::new()),
            stats: Arc::new(TransactionProcessorStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<TransactionProcessorStats> {
        self.stats.clone()
    }

    /// Handle one transaction event. One repository transaction per message;
    /// the broker acknowledgement happens in the consumer after this
    /// returns.
    pub async fn handle_transaction_message(&self, headers: &MessageHeaders) -> ClientResult<()> {
        match headers.transaction_state {
            Some(TransactionState::New) => self.process_new_transaction_message(headers).await,
            Some(TransactionState::Failed) => {
                self.update_job_state_if_required(headers).await?;
                self.apply_transaction_update(headers).await
            }
            Some(_) => self.apply_transaction_update(headers).await,
            None => {
                debug!("Transaction event without a transaction state, dropping");
                Ok(())
            }
        }
    }

    async fn process_new_transaction_message(&self, headers: &MessageHeaders) -> ClientResult<()> {
        let Some(transaction_id) = headers.transaction_id else {
            warn!("NEW transaction event without a transaction id, dropping");
            return Ok(());
        };

        let mut transaction = Transaction::new(transaction_id, None, headers.timestamp);

        if let Some(job_id) = headers.job_id {
            self.create_job_if_not_existing(job_id, headers).await?;
            transaction.job_id = Some(job_id);
        }

        match self.transactions.insert(&transaction).await {
            Ok(()) => {
                self.stats
                    .transactions_created
                    .fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) if e.is_unique_violation() => {
                debug!(%transaction_id, "Transaction already existing");
                self.stats
                    .duplicate_new_dropped
                    .fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Ensure the SyncJob referenced by the header exists, creating it
    /// lazily on first reference.
    ///
    /// The cache mutex is held across check and insert so only one worker of
    /// this process creates the row; cross-process races resolve through the
    /// repository's unique-key constraint. The cache is populated only from
    /// repository observations, not on creation, so a second process reads
    /// the persisted row.
    async fn create_job_if_not_existing(
        &self,
        job_id: Uuid,
        headers: &MessageHeaders,
    ) -> ClientResult<()> {
        let mut cache = self.sync_job_cache.lock().await;

        if cache.contains_key(&job_id) {
            return Ok(());
        }

        if let Some(job) = self.sync_jobs.find_by_job_id(job_id).await? {
            cache.insert(job_id, job);
            return Ok(());
        }

        let job = SyncJob::new(
            job_id,
            headers.job_type.unwrap_or(JobType::Full),
            headers.timestamp,
        );
        match self.sync_jobs.insert(&job).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_unique_violation() => {
                // Another writer got there first; its row is authoritative.
                debug!(%job_id, "Sync job already existing");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Failure escalation: a failing transaction of a FULL job marks the job
    /// FAILED_PROCESSING. The terminal COMPLETED/FAILED decision stays with
    /// the sedex message state processor.
    async fn update_job_state_if_required(&self, headers: &MessageHeaders) -> ClientResult<()> {
        let Some(job_id) = headers.job_id else {
            return Ok(());
        };
        let Some(mut job) = self.sync_jobs.find_by_job_id(job_id).await? else {
            return Ok(());
        };
        if job.job_type != JobType::Full {
            return Ok(());
        }

        match job.set_state_with_timestamp(JobState::FailedProcessing, headers.timestamp) {
            Ok(()) => {
                self.sync_jobs.update(&job).await?;
                self.stats
                    .jobs_failed_processing
                    .fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                warn!(%job_id, error = %e, "Ignoring failure escalation on terminal job");
                return Ok(());
            }
        }

        if let Some(manager) = &self.full_sync_state_manager {
            if manager.current_full_sync_job_id().await == Some(job_id) {
                if let Err(e) = manager.fail().await {
                    debug!(%job_id, error = %e, "Full sync lifecycle not failable");
                }
            }
        }

        Ok(())
    }

    async fn apply_transaction_update(&self, headers: &MessageHeaders) -> ClientResult<()> {
        let Some(state) = headers.transaction_state else {
            return Ok(());
        };
        let Some(transaction_id) = headers.transaction_id else {
            debug!("Transaction event without a transaction id, dropping");
            return Ok(());
        };

        let Some(mut transaction) = self
            .transactions
            .find_by_transaction_id(transaction_id)
            .await?
        else {
            // The NEW event will, or did, create the row; without it this
            // update has nothing to attach to.
            debug!(%transaction_id, %state, "Dropping state event for unknown transaction");
            self.stats
                .unknown_transaction_dropped
                .fetch_add(1, Ordering::Relaxed);
            return Ok(());
        };

        if transaction.advance_state(state, headers.timestamp) {
            self.transactions.update(&transaction).await?;
        } else {
            debug!(
                %transaction_id,
                current = %transaction.state,
                attempted = %state,
                "Dropping non-monotonic transaction state update"
            );
            self.stats
                .stale_update_dropped
                .fetch_add(1, Ordering::Relaxed);
        }

        Ok(())
    }
}

#[async_trait]
impl DeliveryHandler for TransactionStateProcessor {
    async fn handle(&self, headers: &MessageHeaders) -> ClientResult<()> {
        if headers.category_or_unknown() == MessageCategory::TransactionEvent {
            self.handle_transaction_message(headers).await
        } else {
            // Unknown categories are silently ignored.
            Ok(())
        }
    }
}
