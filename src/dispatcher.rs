// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Message Dispatcher
//!
//! `subscribe` wires a queue to a handler: it declares and binds the queue on a fresh
//! channel, limits the channel's prefetch, starts a manual-ack consumer and spawns one
//! task that feeds every delivery through the decoder and handler before settling it.
//!
//! Deliveries of one subscription are handled strictly one after the other, in the order
//! the broker delivers them. Separate subscriptions run independently on their own
//! channels. The returned `Subscription` can cancel its consumer without closing the
//! connection; dropping it leaves the consumer running until the channel closes.

use crate::{
    broker::{AmqpChannel, AmqpConnection, Consumer, DeclaredQueue},
    codec::{BinaryDecoder, Decoder, JsonDecoder},
    configs::{RabbitMQConfigs, DEFAULT_DEAD_LETTER_EXCHANGE, DEFAULT_PREFETCH_COUNT},
    consumer::{consume, FailurePolicy},
    errors::AmqpError,
    handler::Handler,
    queue::{ExchangeBinding, QueueDefinition},
    topology::declare_and_bind_queue,
};
use futures_util::StreamExt;
use lapin::{options::BasicConsumeOptions, types::FieldTable};
use opentelemetry::global;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::{sync::Notify, task::JoinHandle};
use tracing::{debug, error};

/// Per-subscription settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionOptions {
    /// Unacknowledged deliveries the broker may push to the subscription's channel.
    pub prefetch_count: u16,
    /// Exchange the declared queue dead-letters into.
    pub dead_letter_exchange: String,
    /// Handling of undecodable payloads and panicking decoders or handlers.
    pub failure_policy: FailurePolicy,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        SubscriptionOptions {
            prefetch_count: DEFAULT_PREFETCH_COUNT,
            dead_letter_exchange: DEFAULT_DEAD_LETTER_EXCHANGE.to_owned(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl From<&RabbitMQConfigs> for SubscriptionOptions {
    fn from(cfg: &RabbitMQConfigs) -> Self {
        SubscriptionOptions {
            prefetch_count: cfg.prefetch_count,
            dead_letter_exchange: cfg.dead_letter_exchange.clone(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

/// Handle to a running subscription.
///
/// Dropping the handle detaches the dispatch task: it keeps consuming until the delivery
/// stream closes.
pub struct Subscription {
    queue: DeclaredQueue,
    consumer_tag: String,
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

impl Subscription {
    /// The queue this subscription consumes from.
    pub fn queue(&self) -> &DeclaredQueue {
        &self.queue
    }

    /// Broker-assigned consumer tag.
    pub fn consumer_tag(&self) -> &str {
        &self.consumer_tag
    }

    /// True once the dispatch loop has stopped.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancels the consumer and waits for the delivery being handled, if any, to settle.
    ///
    /// Deliveries the broker already pushed but the loop has not started on are left
    /// unsettled; the broker requeues them once the channel closes. The connection and
    /// other subscriptions are not affected.
    ///
    /// # Returns
    /// Ok(()) once the dispatch task has stopped, or `AmqpError::InternalError` if it
    /// could not be joined
    pub async fn cancel(self) -> Result<(), AmqpError> {
        self.shutdown.notify_one();
        self.closed().await
    }

    /// Waits until the dispatch loop stops on its own, i.e. the delivery stream closes.
    ///
    /// # Returns
    /// Ok(()) once the dispatch task has stopped, or `AmqpError::InternalError` if it
    /// could not be joined
    pub async fn closed(self) -> Result<(), AmqpError> {
        self.task.await.map_err(|err| {
            error!(error = err.to_string(), "tokio process error");
            AmqpError::InternalError
        })
    }
}

/// Subscribes `handler` to the queue described by `binding`, decoding payloads with
/// `decoder`.
///
/// Setup failures (channel, declaration, binding, QoS, consume) are returned to the
/// caller. Once the consumer is running, failures are confined to the dispatch task and
/// logged.
///
/// # Parameters
/// * `conn` - The connection the subscription opens its own channel on
/// * `binding` - Exchange, queue, routing key and durability of the subscription
/// * `decoder` - Turns each payload into the handler's input
/// * `handler` - Application logic returning a verdict per message
/// * `options` - Prefetch, dead-letter exchange and failure policy
///
/// # Returns
/// A handle to the running subscription, or the first setup error
pub async fn subscribe<T, D, H>(
    conn: &dyn AmqpConnection,
    binding: &ExchangeBinding,
    decoder: D,
    handler: H,
    options: SubscriptionOptions,
) -> Result<Subscription, AmqpError>
where
    T: Send + 'static,
    D: Decoder<T>,
    H: Handler<T>,
{
    let def = QueueDefinition::from(binding).dead_letter_exchange(&options.dead_letter_exchange);
    let (channel, queue) = declare_and_bind_queue(conn, binding, &def).await?;

    channel.set_prefetch(options.prefetch_count, false).await?;

    let consumer = channel
        .consume(
            &queue.name,
            "",
            BasicConsumeOptions {
                no_local: false,
                no_ack: false,
                exclusive: false,
                nowait: false,
            },
            FieldTable::default(),
        )
        .await?;

    debug!(queue = %queue.name, consumer_tag = %consumer.tag, "consumer started");

    let consumer_tag = consumer.tag.clone();
    let shutdown = Arc::new(Notify::new());
    let task = tokio::spawn(dispatch::<T, D, H>(
        channel,
        consumer,
        queue.name.clone(),
        decoder,
        handler,
        options.failure_policy,
        shutdown.clone(),
    ));

    Ok(Subscription {
        queue,
        consumer_tag,
        shutdown,
        task,
    })
}

/// [`subscribe`] with JSON payloads.
///
/// # Parameters
/// * `conn` - The connection the subscription opens its own channel on
/// * `binding` - Exchange, queue, routing key and durability of the subscription
/// * `handler` - Application logic returning a verdict per message
/// * `options` - Prefetch, dead-letter exchange and failure policy
///
/// # Returns
/// A handle to the running subscription, or the first setup error
pub async fn subscribe_json<T, H>(
    conn: &dyn AmqpConnection,
    binding: &ExchangeBinding,
    handler: H,
    options: SubscriptionOptions,
) -> Result<Subscription, AmqpError>
where
    T: DeserializeOwned + Send + 'static,
    H: Handler<T>,
{
    subscribe(conn, binding, JsonDecoder, handler, options).await
}

/// [`subscribe`] with bincode payloads.
///
/// # Parameters
/// * `conn` - The connection the subscription opens its own channel on
/// * `binding` - Exchange, queue, routing key and durability of the subscription
/// * `handler` - Application logic returning a verdict per message
/// * `options` - Prefetch, dead-letter exchange and failure policy
///
/// # Returns
/// A handle to the running subscription, or the first setup error
pub async fn subscribe_binary<T, H>(
    conn: &dyn AmqpConnection,
    binding: &ExchangeBinding,
    handler: H,
    options: SubscriptionOptions,
) -> Result<Subscription, AmqpError>
where
    T: DeserializeOwned + Send + 'static,
    H: Handler<T>,
{
    subscribe(conn, binding, BinaryDecoder, handler, options).await
}

async fn dispatch<T, D, H>(
    channel: Arc<dyn AmqpChannel>,
    mut consumer: Consumer,
    queue: String,
    decoder: D,
    handler: H,
    policy: FailurePolicy,
    shutdown: Arc<Notify>,
) where
    T: Send + 'static,
    D: Decoder<T>,
    H: Handler<T>,
{
    let tracer = global::tracer("amqp consumer");
    let cancelled = shutdown.notified();
    tokio::pin!(cancelled);

    loop {
        tokio::select! {
            // a pending cancellation wins over the next delivery
            biased;

            _ = &mut cancelled => {
                debug!(queue = %queue, "subscription cancelled");
                if let Err(err) = channel.cancel(&consumer.tag).await {
                    error!(error = err.to_string(), queue = %queue, "error cancelling consumer");
                }
                break;
            }

            event = consumer.deliveries.next() => match event {
                None => {
                    debug!(queue = %queue, "delivery stream closed");
                    break;
                }
                Some(Err(err)) => error!(error = err.to_string(), queue = %queue, "errors consume msg"),
                Some(Ok(delivery)) => {
                    if let Err(err) =
                        consume::<T, D, H>(&tracer, delivery, &queue, &decoder, &handler, policy).await
                    {
                        error!(error = err.to_string(), queue = %queue, "error consume msg");
                    }
                }
            }
        }
    }
}
