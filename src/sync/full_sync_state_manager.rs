//! Singleton state machine for the full-synchronization lifecycle.

use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use super::FullSeedState;
use crate::constants::settings as setting_keys;
use crate::errors::{ClientResult, StateError};
use crate::repository::SettingRepository;

#[derive(Debug, Clone)]
struct FullSyncInner {
    state: FullSeedState,
    job_id: Option<Uuid>,
    seeded: u64,
}

impl Default for FullSyncInner {
    fn default() -> Self {
        Self {
            state: FullSeedState::Ready,
            job_id: None,
            seeded: 0,
        }
    }
}

/// Process-wide owner of the full-sync lifecycle.
///
/// Every public operation is a critical section over the combined
/// (state, job id, counter) tuple, so concurrent seeders observe a
/// consistent view. The tuple is persisted through the Setting repository
/// after each mutation and restored at construction, letting a restarted
/// process resume the cycle where it stopped.
pub struct FullSyncStateManager {
    settings: Arc<dyn SettingRepository>,
    inner: Mutex<FullSyncInner>,
}

impl FullSyncStateManager {
    /// Construct the manager, restoring any persisted lifecycle state.
    pub async fn restore(settings: Arc<dyn SettingRepository>) -> ClientResult<Self> {
        let mut inner = FullSyncInner::default();

        if let Some(setting) = settings.find_by_key(setting_keys::FULL_SYNC_STATE).await? {
            match FullSeedState::from_str(&setting.value) {
                Ok(state) => inner.state = state,
                Err(_) => warn!(
                    value = %setting.value,
                    "Ignoring unparsable persisted full sync state"
                ),
            }
        }
        if let Some(setting) = settings.find_by_key(setting_keys::FULL_SYNC_JOB_ID).await? {
            if !setting.value.is_empty() {
                match Uuid::parse_str(&setting.value) {
                    Ok(job_id) => inner.job_id = Some(job_id),
                    Err(_) => warn!(
                        value = %setting.value,
                        "Ignoring unparsable persisted full sync job id"
                    ),
                }
            }
        }
        if let Some(setting) = settings.find_by_key(setting_keys::FULL_SYNC_SEEDED).await? {
            inner.seeded = setting.value.parse().unwrap_or(0);
        }

        info!(state = %inner.state, job_id = ?inner.job_id, "Full sync state restored");

        Ok(Self {
            settings,
            inner: Mutex::new(inner),
        })
    }

    async fn persist(&self, inner: &FullSyncInner) -> ClientResult<()> {
        self.settings
            .upsert(setting_keys::FULL_SYNC_STATE, &inner.state.to_string())
            .await?;
        self.settings
            .upsert(
                setting_keys::FULL_SYNC_JOB_ID,
                &inner.job_id.map(|id| id.to_string()).unwrap_or_default(),
            )
            .await?;
        self.settings
            .upsert(setting_keys::FULL_SYNC_SEEDED, &inner.seeded.to_string())
            .await?;
        Ok(())
    }

    fn check_transition(
        from: FullSeedState,
        to: FullSeedState,
        allowed_from: &[FullSeedState],
    ) -> Result<(), StateError> {
        if allowed_from.contains(&from) {
            Ok(())
        } else {
            Err(StateError::IllegalFullSyncTransition { from, to })
        }
    }

    /// READY -> SEEDING. Generates a fresh job id, resets the counter and
    /// opens admission. Returns the new job id.
    pub async fn start_seeding(&self) -> ClientResult<Uuid> {
        let mut inner = self.inner.lock().await;
        Self::check_transition(inner.state, FullSeedState::Seeding, &[FullSeedState::Ready])?;

        let job_id = Uuid::new_v4();
        inner.state = FullSeedState::Seeding;
        inner.job_id = Some(job_id);
        inner.seeded = 0;
        self.persist(&inner).await?;

        info!(%job_id, "Full sync seeding started");
        Ok(job_id)
    }

    /// SEEDING -> SEEDED. Closes admission.
    pub async fn submit_seeding(&self) -> ClientResult<()> {
        let mut inner = self.inner.lock().await;
        Self::check_transition(inner.state, FullSeedState::Seeded, &[FullSeedState::Seeding])?;

        inner.state = FullSeedState::Seeded;
        self.persist(&inner).await?;

        info!(job_id = ?inner.job_id, seeded = inner.seeded, "Full sync seeding submitted");
        Ok(())
    }

    /// SEEDING -> FAILED, triggered by the admission surface.
    pub async fn fail_seeding(&self) -> ClientResult<()> {
        let mut inner = self.inner.lock().await;
        Self::check_transition(inner.state, FullSeedState::Failed, &[FullSeedState::Seeding])?;

        inner.state = FullSeedState::Failed;
        self.persist(&inner).await?;

        warn!(job_id = ?inner.job_id, "Full sync seeding failed");
        Ok(())
    }

    /// SEEDING | SEEDED | SENDING -> FAILED, escalation from the state
    /// processors when a transaction or Sedex message of the current job
    /// fails.
    pub async fn fail(&self) -> ClientResult<()> {
        let mut inner = self.inner.lock().await;
        Self::check_transition(
            inner.state,
            FullSeedState::Failed,
            &[
                FullSeedState::Seeding,
                FullSeedState::Seeded,
                FullSeedState::Sending,
            ],
        )?;

        inner.state = FullSeedState::Failed;
        self.persist(&inner).await?;

        warn!(job_id = ?inner.job_id, "Full sync failed");
        Ok(())
    }

    /// SEEDED -> SENDING, signalled by the external batcher when the first
    /// outgoing Sedex message of the job leaves.
    pub async fn start_sending(&self) -> ClientResult<()> {
        let mut inner = self.inner.lock().await;
        Self::check_transition(inner.state, FullSeedState::Sending, &[FullSeedState::Seeded])?;

        inner.state = FullSeedState::Sending;
        self.persist(&inner).await?;
        Ok(())
    }

    /// SENDING -> SENT, signalled when all outgoing Sedex messages are
    /// dispatched.
    pub async fn finish_sending(&self) -> ClientResult<()> {
        let mut inner = self.inner.lock().await;
        Self::check_transition(inner.state, FullSeedState::Sent, &[FullSeedState::Sending])?;

        inner.state = FullSeedState::Sent;
        self.persist(&inner).await?;

        info!(job_id = ?inner.job_id, "Full sync sending finished");
        Ok(())
    }

    /// SENT | FAILED -> READY. Clears job id and counter.
    pub async fn reset(&self) -> ClientResult<()> {
        let mut inner = self.inner.lock().await;
        Self::check_transition(
            inner.state,
            FullSeedState::Ready,
            &[FullSeedState::Sent, FullSeedState::Failed],
        )?;

        inner.state = FullSeedState::Ready;
        inner.job_id = None;
        inner.seeded = 0;
        self.persist(&inner).await?;

        info!("Full sync state reset");
        Ok(())
    }

    pub async fn is_in_state_seeding(&self) -> bool {
        self.inner.lock().await.state == FullSeedState::Seeding
    }

    pub async fn current_state(&self) -> FullSeedState {
        self.inner.lock().await.state
    }

    pub async fn current_full_sync_job_id(&self) -> Option<Uuid> {
        self.inner.lock().await.job_id
    }

    /// Increment the seeded-message counter by one and return the new value.
    pub async fn inc_full_seed_message_counter(&self) -> ClientResult<u64> {
        let mut inner = self.inner.lock().await;
        inner.seeded += 1;
        self.persist(&inner).await?;
        Ok(inner.seeded)
    }

    pub async fn full_seed_message_count(&self) -> u64 {
        self.inner.lock().await.seeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ClientError;
    use crate::repository::InMemoryRepositories;

    async fn manager() -> (Arc<InMemoryRepositories>, FullSyncStateManager) {
        let repos = InMemoryRepositories::new();
        let manager = FullSyncStateManager::restore(repos.clone())
            .await
            .unwrap();
        (repos, manager)
    }

    #[tokio::test]
    async fn test_full_cycle_transitions() {
        let (_, manager) = manager().await;
        assert_eq!(manager.current_state().await, FullSeedState::Ready);

        let job_id = manager.start_seeding().await.unwrap();
        assert!(manager.is_in_state_seeding().await);
        assert_eq!(manager.current_full_sync_job_id().await, Some(job_id));

        manager.submit_seeding().await.unwrap();
        manager.start_sending().await.unwrap();
        manager.finish_sending().await.unwrap();
        assert_eq!(manager.current_state().await, FullSeedState::Sent);

        manager.reset().await.unwrap();
        assert_eq!(manager.current_state().await, FullSeedState::Ready);
        assert_eq!(manager.current_full_sync_job_id().await, None);
    }

    #[tokio::test]
    async fn test_illegal_transitions_are_rejected() {
        let (_, manager) = manager().await;

        // Not seeding yet.
        assert!(matches!(
            manager.submit_seeding().await,
            Err(ClientError::State(StateError::IllegalFullSyncTransition { .. }))
        ));

        manager.start_seeding().await.unwrap();
        // Double start while a cycle is running.
        assert!(manager.start_seeding().await.is_err());
        // SEEDING cannot jump to SENDING.
        assert!(manager.start_sending().await.is_err());
        // Reset only applies to SENT or FAILED.
        assert!(manager.reset().await.is_err());
    }

    #[tokio::test]
    async fn test_fail_is_allowed_from_seeded_and_sending() {
        let (_, manager) = manager().await;
        manager.start_seeding().await.unwrap();
        manager.submit_seeding().await.unwrap();
        manager.fail().await.unwrap();
        assert_eq!(manager.current_state().await, FullSeedState::Failed);

        manager.reset().await.unwrap();
        manager.start_seeding().await.unwrap();
        manager.submit_seeding().await.unwrap();
        manager.start_sending().await.unwrap();
        manager.fail().await.unwrap();
        assert_eq!(manager.current_state().await, FullSeedState::Failed);
    }

    #[tokio::test]
    async fn test_fail_seeding_requires_seeding() {
        let (_, manager) = manager().await;
        assert!(manager.fail_seeding().await.is_err());
        manager.start_seeding().await.unwrap();
        manager.fail_seeding().await.unwrap();
        assert_eq!(manager.current_state().await, FullSeedState::Failed);
    }

    #[tokio::test]
    async fn test_counter_increments_and_resets() {
        let (_, manager) = manager().await;
        manager.start_seeding().await.unwrap();
        assert_eq!(manager.inc_full_seed_message_counter().await.unwrap(), 1);
        assert_eq!(manager.inc_full_seed_message_counter().await.unwrap(), 2);
        assert_eq!(manager.full_seed_message_count().await, 2);

        manager.fail_seeding().await.unwrap();
        manager.reset().await.unwrap();
        assert_eq!(manager.full_seed_message_count().await, 0);
    }

    #[tokio::test]
    async fn test_lifecycle_survives_restart() {
        let (repos, manager) = manager().await;
        let job_id = manager.start_seeding().await.unwrap();
        manager.inc_full_seed_message_counter().await.unwrap();
        manager.inc_full_seed_message_counter().await.unwrap();
        drop(manager);

        let restored = FullSyncStateManager::restore(repos).await.unwrap();
        assert!(restored.is_in_state_seeding().await);
        assert_eq!(restored.current_full_sync_job_id().await, Some(job_id));
        assert_eq!(restored.full_seed_message_count().await, 2);
    }
}
