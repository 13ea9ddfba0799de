//! # Entity Models
//!
//! Durable entities of the sync client and their lifecycle enums. Entities
//! are plain value types; associations are foreign keys resolved through the
//! repository layer, never in-memory pointers.

pub mod person_data;
pub mod sedex_message;
pub mod setting;
pub mod sync_job;
pub mod transaction;
pub mod types;

pub use person_data::PersonData;
pub use sedex_message::SedexMessage;
pub use setting::Setting;
pub use sync_job::SyncJob;
pub use transaction::Transaction;
pub use types::{JobState, JobType, SedexMessageState, TransactionState};
