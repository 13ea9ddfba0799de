//! # Broker Topology and Setting Constants
//!
//! Names of the exchanges, queues and routing topics that form the contract
//! with the message broker, plus the persisted setting keys. Queue names are
//! contractual and shared with the external batcher and the Sedex adapter.

/// AMQP exchanges.
pub mod exchanges {
    /// Topic exchange carrying record payloads.
    pub const LWGS: &str = "lwgs";
    /// Topic exchange carrying empty-payload state shadows.
    pub const LWGS_STATE: &str = "lwgs-state";
}

/// Queue names.
pub mod queues {
    pub const PERSONDATA_PARTIAL_INCOMING: &str = "persondata-partial-incoming";
    pub const PERSONDATA_PARTIAL_OUTGOING: &str = "persondata-partial-outgoing";
    pub const PERSONDATA_PARTIAL_FAILED: &str = "persondata-partial-failed";
    pub const PERSONDATA_FULL_INCOMING: &str = "persondata-full-incoming";
    pub const PERSONDATA_FULL_OUTGOING: &str = "persondata-full-outgoing";
    pub const PERSONDATA_FULL_FAILED: &str = "persondata-full-failed";
    pub const TRANSACTION_STATE: &str = "transaction-state";
    pub const SEDEX_STATE: &str = "sedex-state";
    pub const SEDEX_OUTGOING: &str = "sedex-outgoing";
}

/// Routing topics. Each record queue is bound to its own topic; the
/// state queues additionally collect the state shadows published under the
/// record topics.
pub mod topics {
    pub const PERSONDATA_PARTIAL_INCOMING: &str = "persondata-partial-incoming";
    pub const PERSONDATA_PARTIAL_OUTGOING: &str = "persondata-partial-outgoing";
    pub const PERSONDATA_PARTIAL_FAILED: &str = "persondata-partial-failed";
    pub const PERSONDATA_FULL_INCOMING: &str = "persondata-full-incoming";
    pub const PERSONDATA_FULL_OUTGOING: &str = "persondata-full-outgoing";
    pub const PERSONDATA_FULL_FAILED: &str = "persondata-full-failed";
    pub const TRANSACTION_STATE: &str = "transaction-state";
    pub const SEDEX_STATE: &str = "sedex-state";
    pub const SEDEX_OUTGOING: &str = "sedex-outgoing";
}

/// Keys under which the full-sync state manager persists its lifecycle.
pub mod settings {
    pub const FULL_SYNC_STATE: &str = "full.sync.state";
    pub const FULL_SYNC_JOB_ID: &str = "full.sync.jobid";
    pub const FULL_SYNC_SEEDED: &str = "full.sync.seeded";
}

/// Header keys of the message envelope (case-preserving, see
/// [`crate::messaging::envelope::MessageHeaders`]).
pub mod headers {
    pub const SENDER_ID: &str = "senderId";
    pub const JOB_TYPE: &str = "jobType";
    pub const JOB_ID: &str = "jobId";
    pub const MESSAGE_CATEGORY: &str = "messageCategory";
    pub const TRANSACTION_STATE: &str = "transactionState";
    pub const TRANSACTION_ID: &str = "transactionId";
    pub const TIMESTAMP: &str = "timestamp";
}
