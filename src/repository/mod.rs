//! # Repository Layer
//!
//! Thin repository surface over the durable entities: lookup by natural key
//! plus save/upsert, expressed as object-safe async traits so processors can
//! hold `Arc<dyn ...>` and tests can substitute the in-memory provider.
//!
//! The one guarantee the state processors rely on is that a unique-key clash
//! is a distinguishable error kind
//! ([`RepositoryError::UniqueViolation`]): it is how concurrent writers and
//! redelivered NEW events are detected and resolved as "another writer got
//! there first".

pub mod in_memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{SedexMessage, Setting, SyncJob, Transaction};

pub use in_memory::InMemoryRepositories;
pub use postgres::{
    PostgresSedexMessageRepository, PostgresSettingRepository, PostgresSyncJobRepository,
    PostgresTransactionRepository,
};

/// Repository error taxonomy.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// A unique constraint rejected the write. Recovered locally by the
    /// caller; the existing row is authoritative.
    #[error("unique key violation on {entity}: {message}")]
    UniqueViolation { entity: String, message: String },

    #[error("database error: {0}")]
    Database(String),

    #[error("stored value could not be decoded: {0}")]
    Decode(String),
}

impl RepositoryError {
    pub fn unique_violation(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UniqueViolation {
            entity: entity.into(),
            message: message.into(),
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation { .. })
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Persisted key/value settings.
#[async_trait]
pub trait SettingRepository: Send + Sync + 'static {
    async fn find_by_key(&self, key: &str) -> RepositoryResult<Option<Setting>>;

    /// Create or overwrite the value under `key`.
    async fn upsert(&self, key: &str, value: &str) -> RepositoryResult<()>;
}

/// Per-record transactions, keyed by the externally generated transaction id.
#[async_trait]
pub trait TransactionRepository: Send + Sync + 'static {
    async fn find_by_transaction_id(
        &self,
        transaction_id: Uuid,
    ) -> RepositoryResult<Option<Transaction>>;

    /// Insert a new row; a duplicate transaction id surfaces as
    /// [`RepositoryError::UniqueViolation`].
    async fn insert(&self, transaction: &Transaction) -> RepositoryResult<()>;

    /// Persist updated state and timestamp of an existing row.
    async fn update(&self, transaction: &Transaction) -> RepositoryResult<()>;
}

/// Sync jobs, keyed by job id.
#[async_trait]
pub trait SyncJobRepository: Send + Sync + 'static {
    async fn find_by_job_id(&self, job_id: Uuid) -> RepositoryResult<Option<SyncJob>>;

    /// Insert a new row; a duplicate job id surfaces as
    /// [`RepositoryError::UniqueViolation`].
    async fn insert(&self, job: &SyncJob) -> RepositoryResult<()>;

    async fn update(&self, job: &SyncJob) -> RepositoryResult<()>;
}

/// Outbound Sedex messages. Rows are written by the external batcher; this
/// client aggregates them per job.
#[async_trait]
pub trait SedexMessageRepository: Send + Sync + 'static {
    async fn find_by_message_id(&self, message_id: Uuid)
        -> RepositoryResult<Option<SedexMessage>>;

    async fn find_all_by_job_id(&self, job_id: Uuid) -> RepositoryResult<Vec<SedexMessage>>;

    /// Create or update the row for `message.message_id`.
    async fn upsert(&self, message: &SedexMessage) -> RepositoryResult<()>;
}
