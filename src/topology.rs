// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Topology Management
//!
//! Declares the broker-side pieces a subscription consumes from: the queue (with its
//! dead-letter argument) and the binding of that queue to an exchange and routing key.
//! Declarations are idempotent on the broker: repeating an identical declaration is a
//! no-op, while redeclaring a queue with different flags fails.

use crate::{
    broker::{AmqpChannel, AmqpConnection, DeclaredQueue},
    errors::AmqpError,
    exchange::ExchangeDefinition,
    queue::{ExchangeBinding, QueueDefinition},
};
use lapin::{options::ExchangeDeclareOptions, types::FieldTable};
use std::sync::Arc;
use tracing::debug;

/// Declares every exchange in `defs` on `channel`, stopping at the first failure.
///
/// Exchanges are declared in order, so a definition may rely on the exchanges listed
/// before it. Exchanges declared before a failure are left in place.
///
/// # Parameters
/// * `channel` - The channel to declare the exchanges on
/// * `defs` - The exchange definitions, in declaration order
///
/// # Returns
/// Ok(()) when every exchange is declared, or the `AmqpError::DeclareExchangeError` of the
/// first exchange the broker refused
pub async fn declare_exchanges(
    channel: &dyn AmqpChannel,
    defs: &[ExchangeDefinition<'_>],
) -> Result<(), AmqpError> {
    for exch in defs {
        debug!("creating exchange: {}", exch.name);

        channel
            .declare_exchange(
                exch.name,
                exch.kind.into(),
                ExchangeDeclareOptions {
                    passive: false,
                    durable: exch.durable,
                    auto_delete: exch.delete,
                    internal: exch.internal,
                    nowait: false,
                },
                FieldTable::from(exch.params.clone()),
            )
            .await?;

        debug!("exchange: {} was created", exch.name);
    }

    Ok(())
}

/// Opens a new channel on `conn`, declares the binding's queue and binds it to the
/// binding's exchange and routing key.
///
/// The queue flags follow the binding's durability and the queue dead-letters into the
/// default dead-letter exchange. The returned channel belongs to the caller; it is the
/// channel the queue must be consumed from when the queue is exclusive.
///
/// # Parameters
/// * `conn` - The connection to open the channel on
/// * `binding` - Exchange, queue name, routing key and durability to declare
///
/// # Returns
/// The new channel and the declared queue, or the first error among
/// `AmqpError::ChannelError`, `AmqpError::QueueDeclareError` and
/// `AmqpError::QueueBindError`
pub async fn declare_and_bind(
    conn: &dyn AmqpConnection,
    binding: &ExchangeBinding,
) -> Result<(Arc<dyn AmqpChannel>, DeclaredQueue), AmqpError> {
    declare_and_bind_queue(conn, binding, &QueueDefinition::from(binding)).await
}

/// Same as [`declare_and_bind`] with an explicit queue definition, e.g. one pointing at a
/// non-default dead-letter exchange.
///
/// The queue is bound only once its declaration succeeded.
///
/// # Parameters
/// * `conn` - The connection to open the channel on
/// * `binding` - Exchange and routing key the queue is bound with
/// * `def` - The queue to declare
///
/// # Returns
/// The new channel and the declared queue, or the error of the first failing step
pub async fn declare_and_bind_queue(
    conn: &dyn AmqpConnection,
    binding: &ExchangeBinding,
    def: &QueueDefinition,
) -> Result<(Arc<dyn AmqpChannel>, DeclaredQueue), AmqpError> {
    let channel = conn.open_channel().await?;

    debug!("creating queue: {}", def.name);
    let queue = channel
        .declare_queue(&def.name, def.declare_options(), def.arguments())
        .await?;
    debug!("queue: {} was created", queue.name);

    debug!(
        "binding queue: {} to the exchange: {} with the key: {}",
        queue.name, binding.exchange, binding.routing_key
    );
    channel
        .bind_queue(&queue.name, &binding.exchange, &binding.routing_key)
        .await?;

    Ok((channel, queue))
}
