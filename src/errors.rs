// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the RabbitMQ Subscriber
//!
//! The `AmqpError` enum covers every failure the subscription pipeline can report:
//! setup-time failures (channel, queue declaration, binding, QoS, consume), which are
//! returned to the caller of `subscribe`, and per-message failures (decode, ack, nack),
//! which are confined to the dispatch loop and only logged.

use thiserror::Error;

/// Represents errors that can occur while declaring topology and consuming messages.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AmqpError {
    /// Internal errors that don't fit into other categories
    #[error("internal error")]
    InternalError,

    /// Error loading the RabbitMQ configuration
    #[error("failure to load configs `{0}`")]
    ConfigError(String),

    /// Error establishing a connection to the RabbitMQ server
    #[error("failure to connect")]
    ConnectionError,

    /// Error creating a channel from an established connection
    #[error("failure to create a channel")]
    ChannelError,

    /// Error declaring an exchange with the given name
    #[error("failure to declare an exchange `{0}`")]
    DeclareExchangeError(String),

    /// Error declaring a queue with the given name
    #[error("failure to declare a queue `{0}`")]
    QueueDeclareError(String),

    /// Error binding a queue to an exchange
    #[error("failure to bind exchange `{0}` to queue `{1}`")]
    QueueBindError(String, String),

    /// Error configuring Quality of Service parameters
    #[error("failure to configure qos `{0}`")]
    QoSDeclarationError(String),

    /// Error starting a consumer on the given queue
    #[error("failure to consume queue `{0}`")]
    ConsumeError(String),

    /// Error reported by the broker client while a consumer is streaming deliveries
    #[error("failure to receive delivery: {0}")]
    DeliveryStreamError(String),

    /// Error cancelling a consumer
    #[error("failure to cancel consumer `{0}`")]
    CancelConsumerError(String),

    /// Error decoding a message payload
    #[error("failure to decode payload: {0}")]
    DecodeError(String),

    /// Error acknowledging a message
    #[error("failure to ack message")]
    AckMessageError,

    /// Error negative-acknowledging a message
    #[error("failure to nack message")]
    NackMessageError,
}
