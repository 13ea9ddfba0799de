//! Per-record transaction entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::TransactionState;

/// One row per admitted record.
///
/// `transaction_id` is unique and externally generated; `job_id` is present
/// iff the record was admitted under a FULL job and never changes once set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: Uuid,
    pub job_id: Option<Uuid>,
    pub state: TransactionState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// A fresh NEW transaction stamped with the event time from the header.
    pub fn new(transaction_id: Uuid, job_id: Option<Uuid>, timestamp: DateTime<Utc>) -> Self {
        Self {
            transaction_id,
            job_id,
            state: TransactionState::New,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// Advance the state monotonically.
    ///
    /// FAILED is accepted from any non-terminal state; otherwise the new
    /// state must not move backwards in the NEW -> PROCESSED -> SENT
    /// progression. Returns whether the entity changed; a rejected update
    /// leaves the entity untouched so redelivered or reordered events cannot
    /// regress it.
    pub fn advance_state(&mut self, next: TransactionState, timestamp: DateTime<Utc>) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        if next != TransactionState::Failed && next.rank() < self.state.rank() {
            return false;
        }
        self.state = next;
        self.updated_at = timestamp;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transaction() -> Transaction {
        Transaction::new(Uuid::new_v4(), None, Utc::now())
    }

    #[test]
    fn test_forward_progression_is_accepted() {
        let mut tx = transaction();
        assert!(tx.advance_state(TransactionState::Processed, Utc::now()));
        assert!(tx.advance_state(TransactionState::Sent, Utc::now()));
        assert_eq!(tx.state, TransactionState::Sent);
    }

    #[test]
    fn test_backward_update_is_dropped() {
        let mut tx = transaction();
        assert!(tx.advance_state(TransactionState::Sent, Utc::now()));
        assert!(!tx.advance_state(TransactionState::Processed, Utc::now()));
        assert_eq!(tx.state, TransactionState::Sent);
    }

    #[test]
    fn test_failed_is_reachable_from_any_non_terminal_state() {
        let mut tx = transaction();
        assert!(tx.advance_state(TransactionState::Sent, Utc::now()));
        assert!(tx.advance_state(TransactionState::Failed, Utc::now()));
        assert_eq!(tx.state, TransactionState::Failed);
    }

    #[test]
    fn test_failed_is_a_sink() {
        let mut tx = transaction();
        assert!(tx.advance_state(TransactionState::Failed, Utc::now()));
        let stamped = tx.updated_at;
        assert!(!tx.advance_state(TransactionState::Sent, Utc::now()));
        assert!(!tx.advance_state(TransactionState::Failed, Utc::now()));
        assert_eq!(tx.updated_at, stamped);
    }
}
