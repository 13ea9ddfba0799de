//! Record payload carried on the `lwgs` exchange.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The record payload as published by the seeder. The payload string is
/// opaque to the core; only the batcher interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonData {
    #[serde(rename = "transactionId")]
    pub transaction_id: Uuid,
    pub payload: String,
}

impl PersonData {
    pub fn new(transaction_id: Uuid, payload: impl Into<String>) -> Self {
        Self {
            transaction_id,
            payload: payload.into(),
        }
    }
}
