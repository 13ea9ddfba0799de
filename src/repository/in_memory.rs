//! # In-Memory Repositories
//!
//! Thread-safe in-memory implementation of every repository trait, used by
//! the test suite. One struct implements all four traits so a single
//! `Arc<InMemoryRepositories>` can be handed to every component under test.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    RepositoryError, RepositoryResult, SedexMessageRepository, SettingRepository,
    SyncJobRepository, TransactionRepository,
};
use crate::models::{SedexMessage, Setting, SyncJob, Transaction};

/// In-memory store behind every repository trait.
#[derive(Debug, Default)]
pub struct InMemoryRepositories {
    settings: RwLock<HashMap<String, Setting>>,
    transactions: RwLock<HashMap<Uuid, Transaction>>,
    sync_jobs: RwLock<HashMap<Uuid, SyncJob>>,
    sedex_messages: RwLock<HashMap<Uuid, SedexMessage>>,
}

impl InMemoryRepositories {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of persisted transactions (for tests).
    pub async fn transaction_count(&self) -> usize {
        self.transactions.read().await.len()
    }

    /// Number of persisted sync jobs (for tests).
    pub async fn sync_job_count(&self) -> usize {
        self.sync_jobs.read().await.len()
    }
}

#[async_trait]
impl SettingRepository for InMemoryRepositories {
    async fn find_by_key(&self, key: &str) -> RepositoryResult<Option<Setting>> {
        Ok(self.settings.read().await.get(key).cloned())
    }

    async fn upsert(&self, key: &str, value: &str) -> RepositoryResult<()> {
        let mut settings = self.settings.write().await;
        settings.insert(
            key.to_string(),
            Setting {
                key: key.to_string(),
                value: value.to_string(),
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }
}

#[async_trait]
impl TransactionRepository for InMemoryRepositories {
    async fn find_by_transaction_id(
        &self,
        transaction_id: Uuid,
    ) -> RepositoryResult<Option<Transaction>> {
        Ok(self
            .transactions
            .read()
            .await
            .get(&transaction_id)
            .cloned())
    }

    async fn insert(&self, transaction: &Transaction) -> RepositoryResult<()> {
        let mut transactions = self.transactions.write().await;
        if transactions.contains_key(&transaction.transaction_id) {
            return Err(RepositoryError::unique_violation(
                "transactions",
                format!("duplicate transaction id {}", transaction.transaction_id),
            ));
        }
        transactions.insert(transaction.transaction_id, transaction.clone());
        Ok(())
    }

    async fn update(&self, transaction: &Transaction) -> RepositoryResult<()> {
        let mut transactions = self.transactions.write().await;
        transactions.insert(transaction.transaction_id, transaction.clone());
        Ok(())
    }
}

#[async_trait]
impl SyncJobRepository for InMemoryRepositories {
    async fn find_by_job_id(&self, job_id: Uuid) -> RepositoryResult<Option<SyncJob>> {
        Ok(self.sync_jobs.read().await.get(&job_id).cloned())
    }

    async fn insert(&self, job: &SyncJob) -> RepositoryResult<()> {
        let mut sync_jobs = self.sync_jobs.write().await;
        if sync_jobs.contains_key(&job.job_id) {
            return Err(RepositoryError::unique_violation(
                "sync_jobs",
                format!("duplicate job id {}", job.job_id),
            ));
        }
        sync_jobs.insert(job.job_id, job.clone());
        Ok(())
    }

    async fn update(&self, job: &SyncJob) -> RepositoryResult<()> {
        let mut sync_jobs = self.sync_jobs.write().await;
        sync_jobs.insert(job.job_id, job.clone());
        Ok(())
    }
}

#[async_trait]
impl SedexMessageRepository for InMemoryRepositories {
    async fn find_by_message_id(
        &self,
        message_id: Uuid,
    ) -> RepositoryResult<Option<SedexMessage>> {
        Ok(self
            .sedex_messages
            .read()
            .await
            .get(&message_id)
            .cloned())
    }

    async fn find_all_by_job_id(&self, job_id: Uuid) -> RepositoryResult<Vec<SedexMessage>> {
        Ok(self
            .sedex_messages
            .read()
            .await
            .values()
            .filter(|m| m.job_id == Some(job_id))
            .cloned()
            .collect())
    }

    async fn upsert(&self, message: &SedexMessage) -> RepositoryResult<()> {
        let mut sedex_messages = self.sedex_messages.write().await;
        sedex_messages.insert(message.message_id, message.clone());
        Ok(())
    }
}
