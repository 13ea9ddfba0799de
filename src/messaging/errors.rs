//! # Messaging Error Types
//!
//! Structured error types for the broker layer, with helper constructors so
//! providers read cleanly at the call site.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("Broker connection error: {message}")]
    Connection { message: String },

    #[error("Queue operation failed: {queue_name}: {operation}: {message}")]
    QueueOperation {
        queue_name: String,
        operation: String,
        message: String,
    },

    #[error("Exchange operation failed: {exchange}: {message}")]
    ExchangeOperation { exchange: String, message: String },

    #[error("Queue not found: {queue_name}")]
    QueueNotFound { queue_name: String },

    #[error("Message serialization error: {message}")]
    MessageSerialization { message: String },

    #[error("Message deserialization error: {message}")]
    MessageDeserialization { message: String },

    #[error("Configuration error: {component}: {message}")]
    Configuration { component: String, message: String },

    #[error("Internal messaging error: {message}")]
    Internal { message: String },
}

impl MessagingError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn queue_not_found(queue_name: impl Into<String>) -> Self {
        Self::QueueNotFound {
            queue_name: queue_name.into(),
        }
    }

    pub fn queue_operation(
        queue_name: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::QueueOperation {
            queue_name: queue_name.into(),
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn exchange_operation(exchange: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExchangeOperation {
            exchange: exchange.into(),
            message: message.into(),
        }
    }

    pub fn publish(exchange: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExchangeOperation {
            exchange: exchange.into(),
            message: format!("publish failed: {}", message.into()),
        }
    }

    pub fn receive(queue_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::QueueOperation {
            queue_name: queue_name.into(),
            operation: "receive".to_string(),
            message: message.into(),
        }
    }

    pub fn ack(queue_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::QueueOperation {
            queue_name: queue_name.into(),
            operation: "ack".to_string(),
            message: message.into(),
        }
    }

    pub fn nack(queue_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::QueueOperation {
            queue_name: queue_name.into(),
            operation: "nack".to_string(),
            message: message.into(),
        }
    }

    pub fn queue_stats(queue_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::QueueOperation {
            queue_name: queue_name.into(),
            operation: "queue_stats".to_string(),
            message: message.into(),
        }
    }

    pub fn configuration(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            component: component.into(),
            message: message.into(),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::MessageSerialization {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn invalid_receipt_handle(handle: impl Into<String>) -> Self {
        Self::Internal {
            message: format!("Invalid receipt handle: {}", handle.into()),
        }
    }

    pub fn message_not_found(message_id: impl Into<String>) -> Self {
        Self::Internal {
            message: format!("Message not found: {}", message_id.into()),
        }
    }
}

impl From<serde_json::Error> for MessagingError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_syntax() || err.is_data() || err.is_eof() {
            MessagingError::MessageDeserialization {
                message: err.to_string(),
            }
        } else {
            MessagingError::MessageSerialization {
                message: err.to_string(),
            }
        }
    }
}

pub type MessagingResult<T> = Result<T, MessagingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helper_constructors_carry_context() {
        let err = MessagingError::receive("transaction-state", "boom");
        let display = format!("{err}");
        assert!(display.contains("transaction-state"));
        assert!(display.contains("receive"));
        assert!(display.contains("boom"));
    }

    #[test]
    fn test_publish_names_the_exchange() {
        let err = MessagingError::publish("lwgs", "channel closed");
        assert!(matches!(err, MessagingError::ExchangeOperation { .. }));
        assert!(format!("{err}").contains("lwgs"));
    }
}
