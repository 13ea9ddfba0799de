//! Sync job entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::{JobState, JobType};
use crate::errors::StateError;

/// One row per full-sync cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncJob {
    pub job_id: Uuid,
    pub job_type: JobType,
    pub job_state: JobState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SyncJob {
    pub fn new(job_id: Uuid, job_type: JobType, timestamp: DateTime<Utc>) -> Self {
        Self {
            job_id,
            job_type,
            job_state: JobState::New,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// Move the job to `next`, stamping `updated_at`.
    ///
    /// A job already in a terminal state rejects every transition, including
    /// redelivered failure events, so COMPLETED can never regress to FAILED.
    pub fn set_state_with_timestamp(
        &mut self,
        next: JobState,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StateError> {
        if self.job_state.is_terminal() {
            return Err(StateError::TerminalJobState {
                job_id: self.job_id,
                state: self.job_state,
                attempted: next,
            });
        }
        self.job_state = next;
        self.updated_at = timestamp;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> SyncJob {
        SyncJob::new(Uuid::new_v4(), JobType::Full, Utc::now())
    }

    #[test]
    fn test_non_terminal_transitions_are_accepted() {
        let mut job = job();
        job.set_state_with_timestamp(JobState::FailedProcessing, Utc::now())
            .unwrap();
        job.set_state_with_timestamp(JobState::Sending, Utc::now())
            .unwrap();
        job.set_state_with_timestamp(JobState::Completed, Utc::now())
            .unwrap();
        assert_eq!(job.job_state, JobState::Completed);
    }

    #[test]
    fn test_terminal_job_rejects_further_transitions() {
        let mut job = job();
        job.set_state_with_timestamp(JobState::Completed, Utc::now())
            .unwrap();
        let err = job
            .set_state_with_timestamp(JobState::Failed, Utc::now())
            .unwrap_err();
        assert!(matches!(err, StateError::TerminalJobState { .. }));
        assert_eq!(job.job_state, JobState::Completed);
    }
}
