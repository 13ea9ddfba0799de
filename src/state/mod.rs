//! # State Processors
//!
//! The broker-driven writers of the durable state model. The transaction
//! state processor owns Transaction rows and lazy SyncJob creation; the
//! sedex message state processor owns the terminal COMPLETED/FAILED decision
//! of a SyncJob. Both run behind the polling [`QueueConsumer`] with bounded
//! worker pools.

pub mod consumer;
pub mod sedex_processor;
pub mod transaction_processor;

pub use consumer::{ConsumerStats, DeliveryHandler, QueueConsumer};
pub use sedex_processor::SedexMessageStateProcessor;
pub use transaction_processor::TransactionStateProcessor;
