// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Definitions
//!
//! A subscription is described by an `ExchangeBinding`: the exchange and routing key to
//! bind, the queue to declare, and whether that queue is durable or transient. The queue
//! flags sent to the broker are derived from the durability alone, and every queue is
//! declared with a dead-letter exchange so rejected or expired messages are redirected
//! instead of lost.

use crate::configs::DEFAULT_DEAD_LETTER_EXCHANGE;
use lapin::{
    options::QueueDeclareOptions,
    types::{AMQPValue, FieldTable, LongString, ShortString},
};

/// Queue argument naming the dead-letter exchange.
pub const AMQP_HEADERS_DEAD_LETTER_EXCHANGE: &str = "x-dead-letter-exchange";

/// Lifetime of a declared queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueDurability {
    /// Survives broker restarts, shared between consumers, never auto-deleted.
    Durable,
    /// Exclusive to the declaring connection and deleted once unused.
    Transient,
}

/// The exchange/routing key a queue is bound to, plus the queue itself.
///
/// A binding only lives for the duration of the declare call; what persists on the broker
/// depends on `durability`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeBinding {
    /// Exchange the queue is bound to, e.g. `peril_topic`
    pub exchange: String,
    /// Queue to declare and consume from
    pub queue_name: String,
    /// Binding key, may contain topic wildcards such as `army_moves.*`
    pub routing_key: String,
    /// Whether the queue is durable or transient
    pub durability: QueueDurability,
}

impl ExchangeBinding {
    /// Creates a new binding description.
    ///
    /// # Parameters
    /// * `exchange` - The exchange to bind to
    /// * `queue_name` - The queue to declare
    /// * `routing_key` - The binding key
    /// * `durability` - The lifetime of the queue
    ///
    /// # Returns
    /// A new ExchangeBinding instance
    pub fn new(
        exchange: impl Into<String>,
        queue_name: impl Into<String>,
        routing_key: impl Into<String>,
        durability: QueueDurability,
    ) -> Self {
        ExchangeBinding {
            exchange: exchange.into(),
            queue_name: queue_name.into(),
            routing_key: routing_key.into(),
            durability,
        }
    }
}

/// Queue declaration derived from an `ExchangeBinding`.
///
/// Durable queues are declared `durable`; transient queues are declared `exclusive` and
/// `auto_delete`. Both always carry the `x-dead-letter-exchange` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDefinition {
    pub(crate) name: String,
    pub(crate) durable: bool,
    pub(crate) delete: bool,
    pub(crate) exclusive: bool,
    pub(crate) dead_letter_exchange: String,
}

impl QueueDefinition {
    /// Derives the queue flags for `name` from `durability`, dead-lettering into
    /// `DEFAULT_DEAD_LETTER_EXCHANGE`.
    ///
    /// # Parameters
    /// * `name` - The name of the queue
    /// * `durability` - The lifetime of the queue
    ///
    /// # Returns
    /// A new QueueDefinition instance
    pub fn new(name: &str, durability: QueueDurability) -> QueueDefinition {
        let durable = durability == QueueDurability::Durable;

        QueueDefinition {
            name: name.to_owned(),
            durable,
            delete: !durable,
            exclusive: !durable,
            dead_letter_exchange: DEFAULT_DEAD_LETTER_EXCHANGE.to_owned(),
        }
    }

    /// Overrides the exchange rejected and expired messages are routed to.
    ///
    /// # Parameters
    /// * `exchange` - The dead-letter exchange name
    ///
    /// # Returns
    /// Self for method chaining
    pub fn dead_letter_exchange(mut self, exchange: &str) -> Self {
        self.dead_letter_exchange = exchange.to_owned();
        self
    }

    /// Returns the name of the queue.
    ///
    /// # Returns
    /// The queue name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declaration flags. Never passive: the queue is created when missing.
    pub(crate) fn declare_options(&self) -> QueueDeclareOptions {
        QueueDeclareOptions {
            passive: false,
            durable: self.durable,
            exclusive: self.exclusive,
            auto_delete: self.delete,
            nowait: false,
        }
    }

    /// Declaration arguments, holding the dead-letter exchange.
    pub(crate) fn arguments(&self) -> FieldTable {
        let mut args = FieldTable::default();
        args.insert(
            ShortString::from(AMQP_HEADERS_DEAD_LETTER_EXCHANGE),
            AMQPValue::LongString(LongString::from(self.dead_letter_exchange.clone())),
        );
        args
    }
}

impl From<&ExchangeBinding> for QueueDefinition {
    fn from(binding: &ExchangeBinding) -> Self {
        QueueDefinition::new(&binding.queue_name, binding.durability)
    }
}
