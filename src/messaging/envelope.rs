//! # Header Envelope
//!
//! The structured header block attached to every broker message. Downstream
//! components dispatch exclusively on these fields; record payloads stay
//! opaque. The envelope is ephemeral: built at every publish point, parsed
//! once at every consume point.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::headers;
use crate::models::types::{JobType, TransactionState};

/// Consumer dispatch discriminator. Unknown wire values deserialize to
/// [`MessageCategory::Unknown`] and are ignored by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageCategory {
    TransactionEvent,
    SedexEvent,
    Unknown,
}

impl std::fmt::Display for MessageCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TransactionEvent => write!(f, "TRANSACTION_EVENT"),
            Self::SedexEvent => write!(f, "SEDEX_EVENT"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl FromStr for MessageCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TRANSACTION_EVENT" => Ok(Self::TransactionEvent),
            "SEDEX_EVENT" => Ok(Self::SedexEvent),
            _ => Ok(Self::Unknown),
        }
    }
}

/// Typed view of the common message headers.
///
/// Every field except the timestamp is optional; which subset is present
/// depends on the publish point. The timestamp defaults to the wall clock at
/// build time and travels as epoch milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageHeaders {
    pub sender_id: Option<String>,
    pub job_type: Option<JobType>,
    pub job_id: Option<Uuid>,
    pub message_category: Option<MessageCategory>,
    pub transaction_state: Option<TransactionState>,
    pub transaction_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

impl MessageHeaders {
    pub fn builder() -> MessageHeadersBuilder {
        MessageHeadersBuilder::default()
    }

    /// Correlation id contract: `transactionId` when present, else `jobId`,
    /// else unset.
    pub fn correlation_id(&self) -> Option<Uuid> {
        self.transaction_id.or(self.job_id)
    }

    /// Message category, with absent and unparsable values mapped to
    /// [`MessageCategory::Unknown`].
    pub fn category_or_unknown(&self) -> MessageCategory {
        self.message_category.unwrap_or(MessageCategory::Unknown)
    }

    /// Write the headers onto an outbound string-keyed map.
    pub fn to_wire_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        if let Some(sender_id) = &self.sender_id {
            map.insert(headers::SENDER_ID.to_string(), sender_id.clone());
        }
        if let Some(job_type) = self.job_type {
            map.insert(headers::JOB_TYPE.to_string(), job_type.to_string());
        }
        if let Some(job_id) = self.job_id {
            map.insert(headers::JOB_ID.to_string(), job_id.to_string());
        }
        if let Some(category) = self.message_category {
            map.insert(headers::MESSAGE_CATEGORY.to_string(), category.to_string());
        }
        if let Some(state) = self.transaction_state {
            map.insert(headers::TRANSACTION_STATE.to_string(), state.to_string());
        }
        if let Some(transaction_id) = self.transaction_id {
            map.insert(
                headers::TRANSACTION_ID.to_string(),
                transaction_id.to_string(),
            );
        }
        map.insert(
            headers::TIMESTAMP.to_string(),
            self.timestamp.timestamp_millis().to_string(),
        );
        map
    }

    /// Parse an untyped string-keyed mapping into typed optional fields.
    ///
    /// Malformed or missing fields become `None`; an unknown category becomes
    /// [`MessageCategory::Unknown`]; a missing timestamp is substituted with
    /// the receive time.
    pub fn from_wire_map(map: &HashMap<String, String>) -> Self {
        let timestamp = map
            .get(headers::TIMESTAMP)
            .and_then(|raw| raw.parse::<i64>().ok())
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or_else(Utc::now);

        Self {
            sender_id: map.get(headers::SENDER_ID).cloned(),
            job_type: map
                .get(headers::JOB_TYPE)
                .and_then(|raw| JobType::from_str(raw).ok()),
            job_id: map
                .get(headers::JOB_ID)
                .and_then(|raw| Uuid::parse_str(raw).ok()),
            message_category: map
                .get(headers::MESSAGE_CATEGORY)
                .map(|raw| MessageCategory::from_str(raw).unwrap_or(MessageCategory::Unknown)),
            transaction_state: map
                .get(headers::TRANSACTION_STATE)
                .and_then(|raw| TransactionState::from_str(raw).ok()),
            transaction_id: map
                .get(headers::TRANSACTION_ID)
                .and_then(|raw| Uuid::parse_str(raw).ok()),
            timestamp,
        }
    }
}

/// Builder for [`MessageHeaders`]; every publish point constructs the subset
/// of fields it owns.
#[derive(Debug, Default)]
pub struct MessageHeadersBuilder {
    sender_id: Option<String>,
    job_type: Option<JobType>,
    job_id: Option<Uuid>,
    message_category: Option<MessageCategory>,
    transaction_state: Option<TransactionState>,
    transaction_id: Option<Uuid>,
    timestamp: Option<DateTime<Utc>>,
}

impl MessageHeadersBuilder {
    pub fn sender_id(mut self, sender_id: impl Into<String>) -> Self {
        self.sender_id = Some(sender_id.into());
        self
    }

    pub fn job_type(mut self, job_type: JobType) -> Self {
        self.job_type = Some(job_type);
        self
    }

    pub fn job_id(mut self, job_id: Uuid) -> Self {
        self.job_id = Some(job_id);
        self
    }

    /// Optional variant used where the job id is only present for FULL jobs.
    pub fn optional_job_id(mut self, job_id: Option<Uuid>) -> Self {
        self.job_id = job_id;
        self
    }

    pub fn message_category(mut self, category: MessageCategory) -> Self {
        self.message_category = Some(category);
        self
    }

    pub fn transaction_state(mut self, state: TransactionState) -> Self {
        self.transaction_state = Some(state);
        self
    }

    pub fn transaction_id(mut self, transaction_id: Uuid) -> Self {
        self.transaction_id = Some(transaction_id);
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn build(self) -> MessageHeaders {
        MessageHeaders {
            sender_id: self.sender_id,
            job_type: self.job_type,
            job_id: self.job_id,
            message_category: self.message_category,
            transaction_state: self.transaction_state,
            transaction_id: self.transaction_id,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_roundtrip_preserves_all_fields() {
        let transaction_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();
        let timestamp = DateTime::<Utc>::from_timestamp_millis(1_722_600_000_123).unwrap();

        let headers = MessageHeaders::builder()
            .sender_id("S1")
            .job_type(JobType::Full)
            .job_id(job_id)
            .message_category(MessageCategory::TransactionEvent)
            .transaction_state(TransactionState::New)
            .transaction_id(transaction_id)
            .timestamp(timestamp)
            .build();

        let parsed = MessageHeaders::from_wire_map(&headers.to_wire_map());
        assert_eq!(parsed, headers);
        assert_eq!(parsed.timestamp.timestamp_millis(), 1_722_600_000_123);
    }

    #[test]
    fn test_correlation_id_prefers_transaction_id() {
        let transaction_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();

        let both = MessageHeaders::builder()
            .transaction_id(transaction_id)
            .job_id(job_id)
            .build();
        assert_eq!(both.correlation_id(), Some(transaction_id));

        let job_only = MessageHeaders::builder().job_id(job_id).build();
        assert_eq!(job_only.correlation_id(), Some(job_id));

        let neither = MessageHeaders::builder().build();
        assert_eq!(neither.correlation_id(), None);
    }

    #[test]
    fn test_missing_job_id_is_legal() {
        let headers = MessageHeaders::builder()
            .sender_id("S1")
            .job_type(JobType::Partial)
            .build();
        let parsed = MessageHeaders::from_wire_map(&headers.to_wire_map());
        assert_eq!(parsed.job_id, None);
        assert_eq!(parsed.job_type, Some(JobType::Partial));
    }

    #[test]
    fn test_unknown_category_parses_to_unknown() {
        let mut map = HashMap::new();
        map.insert("messageCategory".to_string(), "SOMETHING_NEW".to_string());
        let parsed = MessageHeaders::from_wire_map(&map);
        assert_eq!(parsed.message_category, Some(MessageCategory::Unknown));
        assert_eq!(parsed.category_or_unknown(), MessageCategory::Unknown);
    }

    #[test]
    fn test_missing_timestamp_falls_back_to_receive_time() {
        let before = Utc::now();
        let parsed = MessageHeaders::from_wire_map(&HashMap::new());
        assert!(parsed.timestamp >= before);
        assert_eq!(parsed.category_or_unknown(), MessageCategory::Unknown);
    }
}
