//! Error types for the sync client.

use thiserror::Error;
use uuid::Uuid;

use crate::messaging::MessagingError;
use crate::models::types::JobState;
use crate::repository::RepositoryError;
use crate::sync::FullSeedState;

/// Illegal lifecycle transitions, for both the persisted job entity and the
/// in-process full-sync state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("illegal full sync transition from {from} to {to}")]
    IllegalFullSyncTransition {
        from: FullSeedState,
        to: FullSeedState,
    },
    #[error("sync job {job_id} is in terminal state {state}, rejecting transition to {attempted}")]
    TerminalJobState {
        job_id: Uuid,
        state: JobState,
        attempted: JobState,
    },
}

/// Top-level error type of the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Admission rejected; surfaced synchronously to the caller, nothing is
    /// published.
    #[error("validation of sender id failed, given sender id {given:?}, valid sender id(s): {valid:?}")]
    SenderIdValidation {
        given: Option<String>,
        valid: Vec<String>,
    },

    /// A sedex-state event referenced a job this process cannot reconcile;
    /// the message is rejected toward the broker's dead-letter policy.
    #[error("no sync job found for job id {job_id:?}")]
    SyncJobNotFound { job_id: Option<Uuid> },

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Messaging(#[from] MessagingError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Configuration(String),
}

pub type ClientResult<T> = Result<T, ClientError>;
