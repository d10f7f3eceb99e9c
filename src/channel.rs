// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Connection Management
//!
//! This module establishes the connection to the RabbitMQ server. Subscriptions open their
//! own channels on the returned connection, so no channel is created here.

use crate::{configs::RabbitMQConfigs, errors::AmqpError};
use lapin::{types::LongString, Connection, ConnectionProperties};
use std::sync::Arc;
use tracing::{debug, error};

/// Creates a new AMQP connection to RabbitMQ.
///
/// The connection is named after `cfg.connection_name` so it can be identified in the
/// management UI, and is wrapped in an `Arc` so several subscriptions can share it.
///
/// # Parameters
/// * `cfg` - Broker address, credentials and connection name
///
/// # Returns
/// The shared connection, or `AmqpError::ConnectionError`
///
/// # Example
/// ```ignore
/// let conn = new_amqp_connection(&RabbitMQConfigs::from_env()?).await?;
/// ```
pub async fn new_amqp_connection(cfg: &RabbitMQConfigs) -> Result<Arc<Connection>, AmqpError> {
    debug!("creating amqp connection...");
    let options = ConnectionProperties::default()
        .with_connection_name(LongString::from(cfg.connection_name.clone()));

    match Connection::connect(&cfg.uri(), options).await {
        Ok(conn) => {
            debug!("amqp connected");
            Ok(Arc::new(conn))
        }
        Err(err) => {
            error!(error = err.to_string(), "failure to connect");
            Err(AmqpError::ConnectionError)
        }
    }
}
