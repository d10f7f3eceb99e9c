// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Broker Capabilities
//!
//! The subscription pipeline never talks to `lapin` directly. It relies on three small
//! capabilities: a connection that can open channels, a channel that can declare, bind,
//! limit prefetch and consume, and a per-delivery acknowledger. This module defines those
//! traits and implements them for the `lapin` client types.

use crate::errors::AmqpError;
use async_trait::async_trait;
use futures_util::{stream::BoxStream, StreamExt};
use lapin::{
    acker::Acker,
    options::{
        BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, BasicNackOptions,
        BasicQosOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
    },
    types::FieldTable,
    BasicProperties, Channel, Connection,
};
#[cfg(test)]
use mockall::automock;
use std::sync::Arc;
use tracing::error;

/// Stream of deliveries produced by a consumer.
pub type DeliveryStream = BoxStream<'static, Result<Delivery, AmqpError>>;

/// Queue state reported by the broker after a declaration.
///
/// Redeclaring an existing queue with identical flags returns its current state, so the
/// counters describe the queue as the broker sees it at declaration time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredQueue {
    /// Queue name, as confirmed by the broker
    pub name: String,
    /// Messages ready for delivery when the queue was declared
    pub message_count: u32,
    /// Consumers attached when the queue was declared
    pub consumer_count: u32,
}

/// An active consumer: the broker-assigned tag and its delivery stream.
pub struct Consumer {
    /// Consumer tag, needed to cancel the consumer
    pub tag: String,
    /// Deliveries pushed by the broker, ends when the consumer or channel closes
    pub deliveries: DeliveryStream,
}

/// One inbound message and the handle used to settle it with the broker.
pub struct Delivery {
    /// Channel-scoped delivery tag
    pub delivery_tag: u64,
    /// Exchange the message was published to
    pub exchange: String,
    /// Routing key the message was published with
    pub routing_key: String,
    /// Whether the broker delivered this message before
    pub redelivered: bool,
    /// AMQP properties, including the headers carrying trace context
    pub properties: BasicProperties,
    /// Raw payload
    pub data: Vec<u8>,
    /// Settles this delivery; called exactly once by the consumer
    pub acker: Box<dyn Acknowledger>,
}

impl From<lapin::message::Delivery> for Delivery {
    fn from(delivery: lapin::message::Delivery) -> Self {
        Delivery {
            delivery_tag: delivery.delivery_tag,
            exchange: delivery.exchange.to_string(),
            routing_key: delivery.routing_key.to_string(),
            redelivered: delivery.redelivered,
            properties: delivery.properties,
            data: delivery.data,
            acker: Box::new(delivery.acker),
        }
    }
}

/// Settles a single delivery with the broker.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Acknowledger: Send + Sync {
    /// Positive acknowledgment.
    ///
    /// # Parameters
    /// * `multiple` - Also acknowledge every earlier unacknowledged delivery on the channel
    ///
    /// # Returns
    /// Ok(()) on success or `AmqpError::AckMessageError`
    async fn ack(&self, multiple: bool) -> Result<(), AmqpError>;

    /// Negative acknowledgment, optionally asking the broker to requeue.
    ///
    /// A message nacked without requeue is routed to the queue's dead-letter exchange.
    ///
    /// # Parameters
    /// * `multiple` - Also reject every earlier unacknowledged delivery on the channel
    /// * `requeue` - Put the message back on the queue for redelivery
    ///
    /// # Returns
    /// Ok(()) on success or `AmqpError::NackMessageError`
    async fn nack(&self, multiple: bool, requeue: bool) -> Result<(), AmqpError>;
}

/// A connection able to open fresh channels.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AmqpConnection: Send + Sync {
    /// Opens a new channel on this connection.
    ///
    /// # Returns
    /// The channel, shared behind an `Arc`, or `AmqpError::ChannelError`
    async fn open_channel(&self) -> Result<Arc<dyn AmqpChannel>, AmqpError>;
}

/// The channel operations the subscription pipeline needs.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AmqpChannel: Send + Sync {
    /// Declares an exchange.
    ///
    /// # Parameters
    /// * `name` - Exchange name
    /// * `kind` - Exchange type
    /// * `options` - Declaration flags (durable, auto-delete, internal, ...)
    /// * `args` - Extra exchange arguments
    ///
    /// # Returns
    /// Ok(()) on success or `AmqpError::DeclareExchangeError` naming the exchange
    async fn declare_exchange(
        &self,
        name: &str,
        kind: lapin::ExchangeKind,
        options: ExchangeDeclareOptions,
        args: FieldTable,
    ) -> Result<(), AmqpError>;

    /// Declares a queue.
    ///
    /// Declaring an existing queue with the same flags and arguments is a no-op; different
    /// flags are rejected by the broker.
    ///
    /// # Parameters
    /// * `name` - Queue name
    /// * `options` - Declaration flags (durable, auto-delete, exclusive, ...)
    /// * `args` - Queue arguments, e.g. the dead-letter exchange
    ///
    /// # Returns
    /// The declared queue or `AmqpError::QueueDeclareError` naming the queue
    async fn declare_queue(
        &self,
        name: &str,
        options: QueueDeclareOptions,
        args: FieldTable,
    ) -> Result<DeclaredQueue, AmqpError>;

    /// Binds a queue to an exchange.
    ///
    /// # Parameters
    /// * `queue` - Queue name
    /// * `exchange` - Exchange name
    /// * `routing_key` - Binding key, may contain topic wildcards
    ///
    /// # Returns
    /// Ok(()) on success or `AmqpError::QueueBindError` naming the exchange and the queue
    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), AmqpError>;

    /// Limits unacknowledged deliveries. AMQP `prefetch_size` is always 0 (no byte limit).
    ///
    /// # Parameters
    /// * `count` - Maximum number of unacknowledged deliveries
    /// * `global` - Apply the limit to the whole channel instead of per consumer
    ///
    /// # Returns
    /// Ok(()) on success or `AmqpError::QoSDeclarationError`
    async fn set_prefetch(&self, count: u16, global: bool) -> Result<(), AmqpError>;

    /// Starts a consumer on a queue.
    ///
    /// # Parameters
    /// * `queue` - Queue name
    /// * `consumer_tag` - Consumer tag, empty to let the broker generate one
    /// * `options` - Consume flags; `no_ack` must stay false for manual acknowledgment
    /// * `args` - Extra consume arguments
    ///
    /// # Returns
    /// The consumer with its delivery stream, or `AmqpError::ConsumeError` naming the queue
    async fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
        options: BasicConsumeOptions,
        args: FieldTable,
    ) -> Result<Consumer, AmqpError>;

    /// Cancels a consumer. Its delivery stream ends; the channel stays open.
    ///
    /// # Parameters
    /// * `consumer_tag` - Tag of the consumer to cancel
    ///
    /// # Returns
    /// Ok(()) on success or `AmqpError::CancelConsumerError`
    async fn cancel(&self, consumer_tag: &str) -> Result<(), AmqpError>;
}

#[async_trait]
impl Acknowledger for Acker {
    async fn ack(&self, multiple: bool) -> Result<(), AmqpError> {
        Acker::ack(self, BasicAckOptions { multiple })
            .await
            .map_err(|err| {
                error!(error = err.to_string(), "error whiling ack msg");
                AmqpError::AckMessageError
            })
    }

    async fn nack(&self, multiple: bool, requeue: bool) -> Result<(), AmqpError> {
        Acker::nack(self, BasicNackOptions { multiple, requeue })
            .await
            .map_err(|err| {
                error!(error = err.to_string(), "error whiling nack msg");
                AmqpError::NackMessageError
            })
    }
}

#[async_trait]
impl AmqpConnection for Connection {
    async fn open_channel(&self) -> Result<Arc<dyn AmqpChannel>, AmqpError> {
        match self.create_channel().await {
            Ok(channel) => Ok(Arc::new(channel)),
            Err(err) => {
                error!(error = err.to_string(), "error to create the channel");
                Err(AmqpError::ChannelError)
            }
        }
    }
}

#[async_trait]
impl AmqpChannel for Channel {
    async fn declare_exchange(
        &self,
        name: &str,
        kind: lapin::ExchangeKind,
        options: ExchangeDeclareOptions,
        args: FieldTable,
    ) -> Result<(), AmqpError> {
        Channel::exchange_declare(self, name, kind, options, args)
            .await
            .map_err(|err| {
                error!(error = err.to_string(), name, "error to declare the exchange");
                AmqpError::DeclareExchangeError(name.to_owned())
            })
    }

    async fn declare_queue(
        &self,
        name: &str,
        options: QueueDeclareOptions,
        args: FieldTable,
    ) -> Result<DeclaredQueue, AmqpError> {
        match Channel::queue_declare(self, name, options, args).await {
            Ok(queue) => Ok(DeclaredQueue {
                name: queue.name().to_string(),
                message_count: queue.message_count(),
                consumer_count: queue.consumer_count(),
            }),
            Err(err) => {
                error!(error = err.to_string(), name, "error to declare the queue");
                Err(AmqpError::QueueDeclareError(name.to_owned()))
            }
        }
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), AmqpError> {
        Channel::queue_bind(
            self,
            queue,
            exchange,
            routing_key,
            QueueBindOptions { nowait: false },
            FieldTable::default(),
        )
        .await
        .map_err(|err| {
            error!(error = err.to_string(), "error to bind queue to exchange");
            AmqpError::QueueBindError(exchange.to_owned(), queue.to_owned())
        })
    }

    async fn set_prefetch(&self, count: u16, global: bool) -> Result<(), AmqpError> {
        Channel::basic_qos(self, count, BasicQosOptions { global })
            .await
            .map_err(|err| {
                error!(error = err.to_string(), "error to configure qos");
                AmqpError::QoSDeclarationError(err.to_string())
            })
    }

    async fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
        options: BasicConsumeOptions,
        args: FieldTable,
    ) -> Result<Consumer, AmqpError> {
        let consumer = match Channel::basic_consume(self, queue, consumer_tag, options, args).await
        {
            Ok(c) => c,
            Err(err) => {
                error!(error = err.to_string(), "error to create the consumer");
                return Err(AmqpError::ConsumeError(queue.to_owned()));
            }
        };

        let tag = consumer.tag().to_string();
        let deliveries = consumer.map(receive).boxed();

        Ok(Consumer { tag, deliveries })
    }

    async fn cancel(&self, consumer_tag: &str) -> Result<(), AmqpError> {
        Channel::basic_cancel(self, consumer_tag, BasicCancelOptions::default())
            .await
            .map_err(|err| {
                error!(error = err.to_string(), "error to cancel the consumer");
                AmqpError::CancelConsumerError(consumer_tag.to_owned())
            })
    }
}

/// Converts one item of a lapin consumer stream.
fn receive(result: lapin::Result<lapin::message::Delivery>) -> Result<Delivery, AmqpError> {
    result.map(Delivery::from).map_err(|err| {
        error!(error = err.to_string(), "errors consume msg");
        AmqpError::DeliveryStreamError(err.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_failures_keep_the_client_reason() {
        let result = receive(Err(lapin::Error::ChannelsLimitReached));

        let Err(AmqpError::DeliveryStreamError(reason)) = result else {
            panic!("expected a delivery stream error");
        };
        assert_eq!(reason, lapin::Error::ChannelsLimitReached.to_string());
    }
}
