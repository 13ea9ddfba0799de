//! # RabbitMQ Broker
//!
//! RabbitMQ implementation of the [`MessageBroker`] trait using the `lapin`
//! crate.
//!
//! - **AMQP 0.9.1** topic exchanges for record payloads and state shadows
//! - **Durable queues** with a per-queue dead letter exchange, so rejected
//!   messages (nack without requeue) land on `{queue}_dlq`
//! - **Publisher confirms** awaited on every publish
//! - **Prefetch control** for consumer backpressure
//!
//! Visibility timeouts are a consumer-side concept here: an unacked message
//! returns to the queue when the channel closes, so the `visibility_timeout`
//! argument of `receive` is accepted for trait compatibility but not applied.

use std::collections::HashMap;

use async_trait::async_trait;
use lapin::options::{
    BasicAckOptions, BasicGetOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};

use crate::config::RabbitmqConfig;
use crate::messaging::envelope::MessageHeaders;
use crate::messaging::errors::MessagingError;
use crate::messaging::service::traits::MessageBroker;
use crate::messaging::service::types::{Delivery, QueueStats, ReceiptHandle, Topology};

/// RabbitMQ-backed broker.
#[derive(Debug)]
pub struct RabbitMqBroker {
    connection: Connection,
    channel: Channel,
    config: RabbitmqConfig,
}

impl RabbitMqBroker {
    /// Connect and open a channel with the configured prefetch.
    pub async fn connect(config: RabbitmqConfig) -> Result<Self, MessagingError> {
        let connection = Connection::connect(
            &config.url,
            ConnectionProperties::default().with_connection_name("persondata-sync-client".into()),
        )
        .await
        .map_err(|e| MessagingError::connection(format!("RabbitMQ connection failed: {e}")))?;

        let channel = connection.create_channel().await.map_err(|e| {
            MessagingError::connection(format!("RabbitMQ channel creation failed: {e}"))
        })?;

        channel
            .basic_qos(config.prefetch_count, BasicQosOptions::default())
            .await
            .map_err(|e| MessagingError::configuration("rabbitmq", format!("Failed to set QoS: {e}")))?;

        Ok(Self {
            connection,
            channel,
            config,
        })
    }

    /// Connection URL with credentials stripped, for logging.
    pub fn connection_url_redacted(&self) -> &str {
        if self.config.url.contains('@') {
            if let Some(scheme_end) = self.config.url.find("://") {
                return &self.config.url[..scheme_end + 3];
            }
        }
        "amqp://..."
    }

    /// Declare the dead letter exchange and queue backing `queue_name`.
    async fn declare_dlx(&self, queue_name: &str) -> Result<(), MessagingError> {
        let dlx_name = format!("{queue_name}_dlx");
        let dlq_name = format!("{queue_name}_dlq");

        self.channel
            .exchange_declare(
                &dlx_name,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| MessagingError::exchange_operation(&dlx_name, format!("DLX creation failed: {e}")))?;

        self.channel
            .queue_declare(
                &dlq_name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                MessagingError::queue_operation(&dlq_name, "create", format!("DLQ creation failed: {e}"))
            })?;

        self.channel
            .queue_bind(
                &dlq_name,
                &dlx_name,
                queue_name,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                MessagingError::queue_operation(&dlq_name, "bind", format!("DLQ binding failed: {e}"))
            })?;

        Ok(())
    }

    async fn declare_queue(&self, queue_name: &str) -> Result<(), MessagingError> {
        self.declare_dlx(queue_name).await?;

        let dlx_name = format!("{queue_name}_dlx");
        let mut args = FieldTable::default();
        args.insert(
            "x-dead-letter-exchange".into(),
            AMQPValue::LongString(dlx_name.into()),
        );
        args.insert(
            "x-dead-letter-routing-key".into(),
            AMQPValue::LongString(queue_name.into()),
        );

        self.channel
            .queue_declare(
                queue_name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                args,
            )
            .await
            .map_err(|e| {
                MessagingError::queue_operation(queue_name, "create", format!("Queue creation failed: {e}"))
            })?;

        Ok(())
    }

    fn field_table_from(headers: &HashMap<String, String>) -> FieldTable {
        let mut table = FieldTable::default();
        for (key, value) in headers {
            table.insert(
                key.as_str().into(),
                AMQPValue::LongString(value.clone().into()),
            );
        }
        table
    }

    fn headers_to_map(table: Option<&FieldTable>) -> HashMap<String, String> {
        let mut map = HashMap::new();
        if let Some(table) = table {
            for (key, value) in table.inner() {
                match value {
                    AMQPValue::LongString(s) => {
                        map.insert(
                            key.as_str().to_string(),
                            String::from_utf8_lossy(s.as_bytes()).to_string(),
                        );
                    }
                    AMQPValue::LongLongInt(n) => {
                        map.insert(key.as_str().to_string(), n.to_string());
                    }
                    AMQPValue::LongInt(n) => {
                        map.insert(key.as_str().to_string(), n.to_string());
                    }
                    AMQPValue::Boolean(b) => {
                        map.insert(key.as_str().to_string(), b.to_string());
                    }
                    _ => {}
                }
            }
        }
        map
    }
}

#[async_trait]
impl MessageBroker for RabbitMqBroker {
    async fn declare_topology(&self, topology: &Topology) -> Result<(), MessagingError> {
        for exchange in &topology.exchanges {
            self.channel
                .exchange_declare(
                    exchange,
                    ExchangeKind::Topic,
                    ExchangeDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await
                .map_err(|e| {
                    MessagingError::exchange_operation(*exchange, format!("Exchange creation failed: {e}"))
                })?;
        }

        for queue_name in topology.queue_names() {
            self.declare_queue(queue_name).await?;
        }

        for binding in &topology.bindings {
            self.channel
                .queue_bind(
                    binding.queue,
                    binding.exchange,
                    binding.routing_key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await
                .map_err(|e| {
                    MessagingError::queue_operation(
                        binding.queue,
                        "bind",
                        format!("Binding to {} failed: {e}", binding.exchange),
                    )
                })?;
        }

        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        headers: &MessageHeaders,
        payload: &[u8],
    ) -> Result<(), MessagingError> {
        let mut properties = BasicProperties::default()
            .with_delivery_mode(2) // persistent
            .with_content_type("application/json".into())
            .with_headers(Self::field_table_from(&headers.to_wire_map()));

        if let Some(correlation_id) = headers.correlation_id() {
            properties = properties.with_correlation_id(correlation_id.to_string().into());
        }

        let confirm = self
            .channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                payload,
                properties,
            )
            .await
            .map_err(|e| MessagingError::publish(exchange, e.to_string()))?;

        confirm
            .await
            .map_err(|e| MessagingError::publish(exchange, format!("confirmation failed: {e}")))?;

        Ok(())
    }

    async fn receive(
        &self,
        queue_name: &str,
        max_messages: usize,
        _visibility_timeout: std::time::Duration,
    ) -> Result<Vec<Delivery>, MessagingError> {
        let mut deliveries = Vec::with_capacity(max_messages);

        for _ in 0..max_messages {
            match self
                .channel
                .basic_get(queue_name, BasicGetOptions { no_ack: false })
                .await
            {
                Ok(Some(message)) => {
                    let headers =
                        Self::headers_to_map(message.delivery.properties.headers().as_ref());
                    let correlation_id = message
                        .delivery
                        .properties
                        .correlation_id()
                        .as_ref()
                        .map(|s| s.as_str().to_string());

                    deliveries.push(Delivery {
                        receipt_handle: ReceiptHandle::from(message.delivery.delivery_tag),
                        headers,
                        correlation_id,
                        payload: message.delivery.data.clone(),
                        redelivered: message.delivery.redelivered,
                        enqueued_at: chrono::Utc::now(),
                    });
                }
                Ok(None) => break,
                Err(e) => {
                    return Err(MessagingError::receive(
                        queue_name,
                        format!("basic_get failed: {e}"),
                    ));
                }
            }
        }

        Ok(deliveries)
    }

    async fn ack(
        &self,
        queue_name: &str,
        receipt_handle: &ReceiptHandle,
    ) -> Result<(), MessagingError> {
        let delivery_tag: u64 = receipt_handle
            .as_str()
            .parse()
            .map_err(|_| MessagingError::invalid_receipt_handle(receipt_handle.as_str()))?;

        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|e| MessagingError::ack(queue_name, format!("ack failed: {e}")))
    }

    async fn nack(
        &self,
        queue_name: &str,
        receipt_handle: &ReceiptHandle,
        requeue: bool,
    ) -> Result<(), MessagingError> {
        let delivery_tag: u64 = receipt_handle
            .as_str()
            .parse()
            .map_err(|_| MessagingError::invalid_receipt_handle(receipt_handle.as_str()))?;

        self.channel
            .basic_nack(
                delivery_tag,
                BasicNackOptions {
                    requeue,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| MessagingError::nack(queue_name, format!("nack failed: {e}")))
    }

    async fn queue_stats(&self, queue_name: &str) -> Result<QueueStats, MessagingError> {
        let queue_state = self
            .channel
            .queue_declare(
                queue_name,
                QueueDeclareOptions {
                    passive: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| MessagingError::queue_stats(queue_name, format!("Queue query failed: {e}")))?;

        Ok(
            QueueStats::new(queue_name, u64::from(queue_state.message_count()))
                .with_consumer_count(u64::from(queue_state.consumer_count())),
        )
    }

    async fn health_check(&self) -> Result<bool, MessagingError> {
        if self.connection.status().connected() {
            Ok(true)
        } else {
            Err(MessagingError::connection(
                "RabbitMQ connection is not connected",
            ))
        }
    }

    fn provider_name(&self) -> &'static str {
        "rabbitmq"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::envelope::MessageHeaders;
    use uuid::Uuid;

    #[test]
    fn test_field_table_roundtrip() {
        let headers = MessageHeaders::builder()
            .sender_id("S1")
            .transaction_id(Uuid::new_v4())
            .build();
        let wire = headers.to_wire_map();

        let table = RabbitMqBroker::field_table_from(&wire);
        let back = RabbitMqBroker::headers_to_map(Some(&table));
        assert_eq!(back, wire);
    }

    // Integration tests require a RabbitMQ instance.

    #[tokio::test]
    #[ignore = "requires RabbitMQ running"]
    async fn test_connect_and_declare_topology() {
        let broker = RabbitMqBroker::connect(RabbitmqConfig::default())
            .await
            .unwrap();
        assert_eq!(broker.provider_name(), "rabbitmq");

        broker.declare_topology(&Topology::standard()).await.unwrap();
        assert!(broker.health_check().await.unwrap());
    }

    #[tokio::test]
    #[ignore = "requires RabbitMQ running"]
    async fn test_publish_receive_roundtrip() {
        let broker = RabbitMqBroker::connect(RabbitmqConfig::default())
            .await
            .unwrap();
        broker.declare_topology(&Topology::standard()).await.unwrap();

        let transaction_id = Uuid::new_v4();
        let headers = MessageHeaders::builder()
            .sender_id("S1")
            .transaction_id(transaction_id)
            .build();

        broker
            .publish("lwgs-state", "transaction-state", &headers, b"")
            .await
            .unwrap();

        let deliveries = broker
            .receive("transaction-state", 1, std::time::Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(
            deliveries[0].correlation_id.as_deref(),
            Some(transaction_id.to_string().as_str())
        );

        broker
            .ack("transaction-state", &deliveries[0].receipt_handle)
            .await
            .unwrap();
    }
}
