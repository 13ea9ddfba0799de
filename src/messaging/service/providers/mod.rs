//! # Broker Providers
//!
//! Concrete implementations of the [`MessageBroker`](super::MessageBroker)
//! trait.
//!
//! - [`RabbitMqBroker`] - RabbitMQ via the lapin crate
//! - [`InMemoryBroker`] - thread-safe in-memory routing for tests

mod in_memory;
mod rabbitmq;

pub use in_memory::InMemoryBroker;
pub use rabbitmq::RabbitMqBroker;
