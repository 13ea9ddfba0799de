//! Outbound Sedex message entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::SedexMessageState;

/// One row per outbound transport message produced by the external batcher.
///
/// Writes are owned by the batcher; this client only reads the per-job set
/// to decide the owning job's terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SedexMessage {
    pub message_id: Uuid,
    pub job_id: Option<Uuid>,
    pub state: SedexMessageState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SedexMessage {
    pub fn new(
        message_id: Uuid,
        job_id: Option<Uuid>,
        state: SedexMessageState,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            message_id,
            job_id,
            state,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }
}
