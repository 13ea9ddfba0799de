//! # PostgreSQL Repositories
//!
//! sqlx-backed implementations of the repository traits. Unique-key clashes
//! are mapped from the database error into
//! [`RepositoryError::UniqueViolation`] so the processors can treat them as
//! "another writer got there first".

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{
    RepositoryError, RepositoryResult, SedexMessageRepository, SettingRepository,
    SyncJobRepository, TransactionRepository,
};
use crate::models::types::{JobState, JobType, SedexMessageState, TransactionState};
use crate::models::{SedexMessage, Setting, SyncJob, Transaction};

fn map_sqlx_error(entity: &str, err: sqlx::Error) -> RepositoryError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            RepositoryError::unique_violation(entity, db_err.to_string())
        }
        _ => RepositoryError::Database(err.to_string()),
    }
}

#[derive(Debug, FromRow)]
struct SettingRow {
    key: String,
    value: String,
    updated_at: DateTime<Utc>,
}

impl From<SettingRow> for Setting {
    fn from(row: SettingRow) -> Self {
        Setting {
            key: row.key,
            value: row.value,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct TransactionRow {
    transaction_id: Uuid,
    job_id: Option<Uuid>,
    state: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = RepositoryError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(Transaction {
            transaction_id: row.transaction_id,
            job_id: row.job_id,
            state: TransactionState::from_str(&row.state).map_err(RepositoryError::Decode)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct SyncJobRow {
    job_id: Uuid,
    job_type: String,
    job_state: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SyncJobRow> for SyncJob {
    type Error = RepositoryError;

    fn try_from(row: SyncJobRow) -> Result<Self, Self::Error> {
        Ok(SyncJob {
            job_id: row.job_id,
            job_type: JobType::from_str(&row.job_type).map_err(RepositoryError::Decode)?,
            job_state: JobState::from_str(&row.job_state).map_err(RepositoryError::Decode)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct SedexMessageRow {
    message_id: Uuid,
    job_id: Option<Uuid>,
    state: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SedexMessageRow> for SedexMessage {
    type Error = RepositoryError;

    fn try_from(row: SedexMessageRow) -> Result<Self, Self::Error> {
        Ok(SedexMessage {
            message_id: row.message_id,
            job_id: row.job_id,
            state: SedexMessageState::from_str(&row.state).map_err(RepositoryError::Decode)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Settings table access.
#[derive(Debug, Clone)]
pub struct PostgresSettingRepository {
    pool: PgPool,
}

impl PostgresSettingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingRepository for PostgresSettingRepository {
    async fn find_by_key(&self, key: &str) -> RepositoryResult<Option<Setting>> {
        let row = sqlx::query_as::<_, SettingRow>(
            "SELECT key, value, updated_at FROM settings WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("settings", e))?;

        Ok(row.map(Setting::from))
    }

    async fn upsert(&self, key: &str, value: &str) -> RepositoryResult<()> {
        sqlx::query(
            r"
            INSERT INTO settings (key, value, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
            ",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("settings", e))?;

        Ok(())
    }
}

/// Transactions table access.
#[derive(Debug, Clone)]
pub struct PostgresTransactionRepository {
    pool: PgPool,
}

impl PostgresTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionRepository for PostgresTransactionRepository {
    async fn find_by_transaction_id(
        &self,
        transaction_id: Uuid,
    ) -> RepositoryResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(
            r"
            SELECT transaction_id, job_id, state, created_at, updated_at
            FROM transactions
            WHERE transaction_id = $1
            ",
        )
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("transactions", e))?;

        row.map(Transaction::try_from).transpose()
    }

    async fn insert(&self, transaction: &Transaction) -> RepositoryResult<()> {
        sqlx::query(
            r"
            INSERT INTO transactions (transaction_id, job_id, state, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(transaction.transaction_id)
        .bind(transaction.job_id)
        .bind(transaction.state.to_string())
        .bind(transaction.created_at)
        .bind(transaction.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("transactions", e))?;

        Ok(())
    }

    async fn update(&self, transaction: &Transaction) -> RepositoryResult<()> {
        sqlx::query(
            r"
            UPDATE transactions
            SET state = $2, updated_at = $3
            WHERE transaction_id = $1
            ",
        )
        .bind(transaction.transaction_id)
        .bind(transaction.state.to_string())
        .bind(transaction.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("transactions", e))?;

        Ok(())
    }
}

/// Sync jobs table access.
#[derive(Debug, Clone)]
pub struct PostgresSyncJobRepository {
    pool: PgPool,
}

impl PostgresSyncJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SyncJobRepository for PostgresSyncJobRepository {
    async fn find_by_job_id(&self, job_id: Uuid) -> RepositoryResult<Option<SyncJob>> {
        let row = sqlx::query_as::<_, SyncJobRow>(
            r"
            SELECT job_id, job_type, job_state, created_at, updated_at
            FROM sync_jobs
            WHERE job_id = $1
            ",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("sync_jobs", e))?;

        row.map(SyncJob::try_from).transpose()
    }

    async fn insert(&self, job: &SyncJob) -> RepositoryResult<()> {
        sqlx::query(
            r"
            INSERT INTO sync_jobs (job_id, job_type, job_state, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(job.job_id)
        .bind(job.job_type.to_string())
        .bind(job.job_state.to_string())
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("sync_jobs", e))?;

        Ok(())
    }

    async fn update(&self, job: &SyncJob) -> RepositoryResult<()> {
        sqlx::query(
            r"
            UPDATE sync_jobs
            SET job_state = $2, updated_at = $3
            WHERE job_id = $1
            ",
        )
        .bind(job.job_id)
        .bind(job.job_state.to_string())
        .bind(job.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("sync_jobs", e))?;

        Ok(())
    }
}

/// Sedex messages table access.
#[derive(Debug, Clone)]
pub struct PostgresSedexMessageRepository {
    pool: PgPool,
}

impl PostgresSedexMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SedexMessageRepository for PostgresSedexMessageRepository {
    async fn find_by_message_id(
        &self,
        message_id: Uuid,
    ) -> RepositoryResult<Option<SedexMessage>> {
        let row = sqlx::query_as::<_, SedexMessageRow>(
            r"
            SELECT message_id, job_id, state, created_at, updated_at
            FROM sedex_messages
            WHERE message_id = $1
            ",
        )
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("sedex_messages", e))?;

        row.map(SedexMessage::try_from).transpose()
    }

    async fn find_all_by_job_id(&self, job_id: Uuid) -> RepositoryResult<Vec<SedexMessage>> {
        let rows = sqlx::query_as::<_, SedexMessageRow>(
            r"
            SELECT message_id, job_id, state, created_at, updated_at
            FROM sedex_messages
            WHERE job_id = $1
            ",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("sedex_messages", e))?;

        rows.into_iter().map(SedexMessage::try_from).collect()
    }

    async fn upsert(&self, message: &SedexMessage) -> RepositoryResult<()> {
        sqlx::query(
            r"
            INSERT INTO sedex_messages (message_id, job_id, state, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (message_id)
            DO UPDATE SET state = EXCLUDED.state, updated_at = EXCLUDED.updated_at
            ",
        )
        .bind(message.message_id)
        .bind(message.job_id)
        .bind(message.state.to_string())
        .bind(message.created_at)
        .bind(message.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("sedex_messages", e))?;

        Ok(())
    }
}
