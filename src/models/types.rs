//! Lifecycle enums shared by the entities and the message envelope.
//!
//! The string form of every variant is contractual: it travels in broker
//! headers and is stored in the database, so `Display`/`FromStr` use the
//! exact wire tokens.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Admission mode of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    /// Streaming admission; records are routed without an enclosing job.
    Partial,
    /// Batched admission; records belong to one sync job.
    Full,
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Partial => write!(f, "PARTIAL"),
            Self::Full => write!(f, "FULL"),
        }
    }
}

impl std::str::FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PARTIAL" => Ok(Self::Partial),
            "FULL" => Ok(Self::Full),
            _ => Err(format!("Invalid job type: {s}")),
        }
    }
}

/// Per-record transaction state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionState {
    New,
    Processed,
    Sent,
    Failed,
}

impl TransactionState {
    /// FAILED is a terminal sink; no transition leaves it.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Position in the forward progression NEW -> PROCESSED -> SENT.
    /// FAILED sits outside the ordering (reachable from any non-terminal).
    pub fn rank(&self) -> u8 {
        match self {
            Self::New => 0,
            Self::Processed => 1,
            Self::Sent => 2,
            Self::Failed => 3,
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "NEW"),
            Self::Processed => write!(f, "PROCESSED"),
            Self::Sent => write!(f, "SENT"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

impl std::str::FromStr for TransactionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(Self::New),
            "PROCESSED" => Ok(Self::Processed),
            "SENT" => Ok(Self::Sent),
            "FAILED" => Ok(Self::Failed),
            _ => Err(format!("Invalid transaction state: {s}")),
        }
    }
}

/// Sync job lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    New,
    Sending,
    Sent,
    Completed,
    Failed,
    /// A transaction belonging to the job failed during processing. Not
    /// terminal; the terminal COMPLETED/FAILED decision is made from the
    /// aggregated Sedex message states.
    FailedProcessing,
}

impl JobState {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "NEW"),
            Self::Sending => write!(f, "SENDING"),
            Self::Sent => write!(f, "SENT"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
            Self::FailedProcessing => write!(f, "FAILED_PROCESSING"),
        }
    }
}

impl std::str::FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(Self::New),
            "SENDING" => Ok(Self::Sending),
            "SENT" => Ok(Self::Sent),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            "FAILED_PROCESSING" => Ok(Self::FailedProcessing),
            _ => Err(format!("Invalid job state: {s}")),
        }
    }
}

/// State of an outbound Sedex message, owned by the external batcher and the
/// Sedex adapter; this client only aggregates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SedexMessageState {
    Created,
    Sent,
    Successful,
    Failed,
}

impl SedexMessageState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Successful | Self::Failed)
    }
}

impl fmt::Display for SedexMessageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "CREATED"),
            Self::Sent => write!(f, "SENT"),
            Self::Successful => write!(f, "SUCCESSFUL"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

impl std::str::FromStr for SedexMessageState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(Self::Created),
            "SENT" => Ok(Self::Sent),
            "SUCCESSFUL" => Ok(Self::Successful),
            "FAILED" => Ok(Self::Failed),
            _ => Err(format!("Invalid sedex message state: {s}")),
        }
    }
}

impl Default for TransactionState {
    fn default() -> Self {
        Self::New
    }
}

impl Default for JobState {
    fn default() -> Self {
        Self::New
    }
}
