//! # Person-Data Sync Client
//!
//! Ingestion and synchronization client that accepts person-data records
//! from upstream producers, hands them to the broker pipeline feeding the
//! Sedex message exchange, and tracks the lifecycle of every record and
//! every full-sync job across the asynchronous stages.
//!
//! ## Architecture
//!
//! Records are admitted by the [`seed::JobSeedService`] in one of two modes:
//! **partial** (streaming, no enclosing job) or **full** (batched under one
//! [`models::SyncJob`], gated by the [`sync::FullSyncStateManager`]). Every
//! stage of the pipeline emits state events onto the `transaction-state` and
//! `sedex-state` queues; the two processors in [`state`] are the only
//! writers of the durable Transaction/SyncJob rows and converge on a
//! terminal job state from the aggregated Sedex message set.
//!
//! ## Module Organization
//!
//! - [`config`] - typed TOML configuration with env overrides
//! - [`constants`] - contractual exchange, queue and topic names
//! - [`database`] - PostgreSQL pool and migrations
//! - [`errors`] - structured error handling
//! - [`messaging`] - header envelope and broker providers (RabbitMQ,
//!   in-memory)
//! - [`models`] - durable entities and lifecycle enums
//! - [`repository`] - repository traits with Postgres and in-memory
//!   providers
//! - [`seed`] - record admission
//! - [`state`] - queue consumers and the two state processors
//! - [`stats`] - queue depth probe
//! - [`sync`] - the full-sync lifecycle singleton

pub mod config;
pub mod constants;
pub mod database;
pub mod errors;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod repository;
pub mod seed;
pub mod state;
pub mod stats;
pub mod sync;

pub use config::ClientConfig;
pub use errors::{ClientError, ClientResult, StateError};
pub use messaging::{MessageBroker, MessageCategory, MessageHeaders};
pub use seed::JobSeedService;
pub use state::{QueueConsumer, SedexMessageStateProcessor, TransactionStateProcessor};
pub use stats::QueueStatsService;
pub use sync::{FullSeedState, FullSyncStateManager};
