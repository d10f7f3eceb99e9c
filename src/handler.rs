// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Handlers
//!
//! A handler receives one decoded message and answers with a `Verdict`. Async closures
//! `Fn(T) -> impl Future<Output = Verdict>` are handlers out of the box; plain
//! `Fn(T) -> Verdict` closures can be wrapped in `SyncHandler`.

use crate::verdict::Verdict;
use async_trait::async_trait;
use std::future::Future;

/// Application logic invoked for every decoded delivery of a subscription.
///
/// The handler never sees the broker: it only returns a `Verdict`, and the consumer turns
/// that verdict into the matching ack or nack. Deliveries of one subscription are handed
/// to the handler one at a time.
#[async_trait]
pub trait Handler<T: Send + 'static>: Send + Sync + 'static {
    /// Handles one decoded message.
    ///
    /// # Parameters
    /// * `msg` - The decoded message
    ///
    /// # Returns
    /// The verdict used to settle the delivery
    async fn handle(&self, msg: T) -> Verdict;
}

#[async_trait]
impl<T, F, Fut> Handler<T> for F
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Verdict> + Send + 'static,
{
    async fn handle(&self, msg: T) -> Verdict {
        self(msg).await
    }
}

/// Adapts a synchronous closure into a `Handler`.
///
/// Useful for handlers that only update in-memory state and never await.
pub struct SyncHandler<F>(pub F);

#[async_trait]
impl<T, F> Handler<T> for SyncHandler<F>
where
    T: Send + 'static,
    F: Fn(T) -> Verdict + Send + Sync + 'static,
{
    async fn handle(&self, msg: T) -> Verdict {
        (self.0)(msg)
    }
}
