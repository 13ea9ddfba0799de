//! # Sedex Message State Processor
//!
//! Consumer-side owner of the terminal SyncJob decision, driven by the
//! `sedex-state` queue. The decision is a pure function of the persisted
//! SedexMessage set, recomputed on every incoming event, so it is safe under
//! arbitrary reordering and redelivery:
//!
//! - non-empty set, every message SUCCESSFUL -> COMPLETED
//! - any message FAILED -> FAILED
//! - otherwise no state change

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use super::consumer::DeliveryHandler;
use crate::errors::{ClientError, ClientResult};
use crate::messaging::envelope::MessageHeaders;
use crate::models::types::{JobState, SedexMessageState};
use crate::repository::{SedexMessageRepository, SyncJobRepository};
use crate::sync::FullSyncStateManager;

/// Counters for processor observability.
#[derive(Debug, Default)]
pub struct SedexProcessorStats {
    pub jobs_completed: AtomicU64,
    pub jobs_failed: AtomicU64,
    /// Redelivered events that would have regressed a terminal job.
    pub terminal_update_rejected: AtomicU64,
}

impl SedexProcessorStats {
    pub fn get_jobs_completed(&self) -> u64 {
        self.jobs_completed.load(Ordering::Relaxed)
    }

    pub fn get_jobs_failed(&self) -> u64 {
        self.jobs_failed.load(Ordering::Relaxed)
    }

    pub fn get_terminal_update_rejected(&self) -> u64 {
        self.terminal_update_rejected.load(Ordering::Relaxed)
    }
}

/// Processor for `sedex-state` events.
pub struct SedexMessageStateProcessor {
    sedex_messages: Arc<dyn SedexMessageRepository>,
    sync_jobs: Arc<dyn SyncJobRepository>,
    /// Escalation target when the current full-sync job fails; absent when
    /// the processor runs outside the admission process.
    full_sync_state_manager: Option<Arc<FullSyncStateManager>>,
    stats: Arc<SedexProcessorStats>,
}

impl SedexMessageStateProcessor {
    pub fn new(
        sedex_messages: Arc<dyn SedexMessageRepository>,
        sync_jobs: Arc<dyn SyncJobRepository>,
        full_sync_state_manager: Option<Arc<FullSyncStateManager>>,
    ) -> Self {
        Self {
            sedex_messages,
            sync_jobs,
            full_sync_state_manager,
            stats: Arc::new(SedexProcessorStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<SedexProcessorStats> {
        self.stats.clone()
    }

    /// Handle one sedex-state event: reload the owning job and its message
    /// set from the repository and derive the next job state.
    pub async fn handle_sedex_message(&self, headers: &MessageHeaders) -> ClientResult<()> {
        let job_id = headers
            .job_id
            .ok_or(ClientError::SyncJobNotFound { job_id: None })?;

        let mut job = self
            .sync_jobs
            .find_by_job_id(job_id)
            .await?
            .ok_or(ClientError::SyncJobNotFound {
                job_id: Some(job_id),
            })?;

        let messages = self.sedex_messages.find_all_by_job_id(job_id).await?;

        let next = if !messages.is_empty()
            && messages
                .iter()
                .all(|m| m.state == SedexMessageState::Successful)
        {
            Some(JobState::Completed)
        } else if messages
            .iter()
            .any(|m| m.state == SedexMessageState::Failed)
        {
            Some(JobState::Failed)
        } else {
            None
        };

        let Some(next) = next else {
            debug!(%job_id, messages = messages.len(), "Sedex message set not decisive yet");
            return Ok(());
        };

        if job.job_state.is_terminal() {
            warn!(
                %job_id,
                state = %job.job_state,
                attempted = %next,
                "Ignoring state change on terminal sync job"
            );
            self.stats
                .terminal_update_rejected
                .fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }

        job.set_state_with_timestamp(next, Utc::now())?;
        self.sync_jobs.update(&job).await?;
        info!(%job_id, state = %next, "Sync job reached terminal state");

        match next {
            JobState::Completed => {
                self.stats.jobs_completed.fetch_add(1, Ordering::Relaxed);
            }
            JobState::Failed => {
                self.stats.jobs_failed.fetch_add(1, Ordering::Relaxed);
                if let Some(manager) = &self.full_sync_state_manager {
                    if manager.current_full_sync_job_id().await == Some(job_id) {
                        if let Err(e) = manager.fail().await {
                            debug!(%job_id, error = %e, "Full sync lifecycle not failable");
                        }
                    }
                }
            }
            _ => {}
        }

        Ok(())
    }
}

#[async_trait]
impl DeliveryHandler for SedexMessageStateProcessor {
    async fn handle(&self, headers: &MessageHeaders) -> ClientResult<()> {
        self.handle_sedex_message(headers).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::types::JobType;
    use crate::models::{SedexMessage, SyncJob};
    use crate::repository::InMemoryRepositories;
    use uuid::Uuid;

    fn sedex_event(job_id: Uuid) -> MessageHeaders {
        MessageHeaders::builder()
            .job_type(JobType::Full)
            .job_id(job_id)
            .message_category(crate::messaging::MessageCategory::SedexEvent)
            .build()
    }

    async fn seed_job(repos: &Arc<InMemoryRepositories>, state: JobState) -> Uuid {
        let job_id = Uuid::new_v4();
        let mut job = SyncJob::new(job_id, JobType::Full, Utc::now());
        if state != JobState::New {
            job.set_state_with_timestamp(state, Utc::now()).unwrap();
        }
        SyncJobRepository::insert(repos.as_ref(), &job).await.unwrap();
        job_id
    }

    async fn seed_messages(
        repos: &Arc<InMemoryRepositories>,
        job_id: Uuid,
        states: &[SedexMessageState],
    ) {
        for state in states {
            SedexMessageRepository::upsert(
                repos.as_ref(),
                &SedexMessage::new(Uuid::new_v4(), Some(job_id), *state, Utc::now()),
            )
            .await
            .unwrap();
        }
    }

    fn processor(repos: &Arc<InMemoryRepositories>) -> SedexMessageStateProcessor {
        SedexMessageStateProcessor::new(repos.clone(), repos.clone(), None)
    }

    #[tokio::test]
    async fn test_unanimous_success_completes_the_job() {
        let repos = InMemoryRepositories::new();
        let processor = processor(&repos);
        let job_id = seed_job(&repos, JobState::Sending).await;
        seed_messages(
            &repos,
            job_id,
            &[
                SedexMessageState::Successful,
                SedexMessageState::Successful,
                SedexMessageState::Successful,
            ],
        )
        .await;

        processor.handle_sedex_message(&sedex_event(job_id)).await.unwrap();

        let job = repos.find_by_job_id(job_id).await.unwrap().unwrap();
        assert_eq!(job.job_state, JobState::Completed);
        assert_eq!(processor.stats().get_jobs_completed(), 1);
    }

    #[tokio::test]
    async fn test_any_failed_message_fails_the_job() {
        let repos = InMemoryRepositories::new();
        let processor = processor(&repos);
        let job_id = seed_job(&repos, JobState::Sending).await;
        seed_messages(
            &repos,
            job_id,
            &[
                SedexMessageState::Successful,
                SedexMessageState::Successful,
                SedexMessageState::Failed,
            ],
        )
        .await;

        processor.handle_sedex_message(&sedex_event(job_id)).await.unwrap();

        let job = repos.find_by_job_id(job_id).await.unwrap().unwrap();
        assert_eq!(job.job_state, JobState::Failed);
    }

    #[tokio::test]
    async fn test_undecided_set_leaves_job_untouched() {
        let repos = InMemoryRepositories::new();
        let processor = processor(&repos);
        let job_id = seed_job(&repos, JobState::Sending).await;
        seed_messages(
            &repos,
            job_id,
            &[SedexMessageState::Successful, SedexMessageState::Sent],
        )
        .await;

        processor.handle_sedex_message(&sedex_event(job_id)).await.unwrap();

        let job = repos.find_by_job_id(job_id).await.unwrap().unwrap();
        assert_eq!(job.job_state, JobState::Sending);
    }

    #[tokio::test]
    async fn test_empty_message_set_is_not_completion() {
        let repos = InMemoryRepositories::new();
        let processor = processor(&repos);
        let job_id = seed_job(&repos, JobState::New).await;

        processor.handle_sedex_message(&sedex_event(job_id)).await.unwrap();

        let job = repos.find_by_job_id(job_id).await.unwrap().unwrap();
        assert_eq!(job.job_state, JobState::New);
    }

    #[tokio::test]
    async fn test_unknown_job_is_rejected() {
        let repos = InMemoryRepositories::new();
        let processor = processor(&repos);

        let err = processor
            .handle_sedex_message(&sedex_event(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::SyncJobNotFound { .. }));
    }

    #[tokio::test]
    async fn test_missing_job_id_is_rejected() {
        let repos = InMemoryRepositories::new();
        let processor = processor(&repos);
        let headers = MessageHeaders::builder().build();

        let err = processor.handle_sedex_message(&headers).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::SyncJobNotFound { job_id: None }
        ));
    }

    #[tokio::test]
    async fn test_late_failure_cannot_regress_completed_job() {
        let repos = InMemoryRepositories::new();
        let processor = processor(&repos);
        let job_id = seed_job(&repos, JobState::Completed).await;
        seed_messages(&repos, job_id, &[SedexMessageState::Failed]).await;

        processor.handle_sedex_message(&sedex_event(job_id)).await.unwrap();

        let job = repos.find_by_job_id(job_id).await.unwrap().unwrap();
        assert_eq!(job.job_state, JobState::Completed);
        assert_eq!(processor.stats().get_terminal_update_rejected(), 1);
    }

    #[tokio::test]
    async fn test_reprocessing_is_idempotent() {
        let repos = InMemoryRepositories::new();
        let processor = processor(&repos);
        let job_id = seed_job(&repos, JobState::Sending).await;
        seed_messages(&repos, job_id, &[SedexMessageState::Successful]).await;

        processor.handle_sedex_message(&sedex_event(job_id)).await.unwrap();
        processor.handle_sedex_message(&sedex_event(job_id)).await.unwrap();

        let job = repos.find_by_job_id(job_id).await.unwrap().unwrap();
        assert_eq!(job.job_state, JobState::Completed);
        // The second delivery hit the terminal guard, not a second write.
        assert_eq!(processor.stats().get_jobs_completed(), 1);
        assert_eq!(processor.stats().get_terminal_update_rejected(), 1);
    }

    #[tokio::test]
    async fn test_failed_job_escalates_to_full_sync_manager() {
        let repos = InMemoryRepositories::new();
        let manager = Arc::new(
            FullSyncStateManager::restore(repos.clone()).await.unwrap(),
        );
        let job_id = manager.start_seeding().await.unwrap();
        manager.submit_seeding().await.unwrap();
        manager.start_sending().await.unwrap();

        let job = SyncJob::new(job_id, JobType::Full, Utc::now());
        SyncJobRepository::insert(repos.as_ref(), &job).await.unwrap();
        seed_messages(&repos, job_id, &[SedexMessageState::Failed]).await;

        let processor =
            SedexMessageStateProcessor::new(repos.clone(), repos.clone(), Some(manager.clone()));
        processor.handle_sedex_message(&sedex_event(job_id)).await.unwrap();

        assert_eq!(
            manager.current_state().await,
            crate::sync::FullSeedState::Failed
        );
    }
}
