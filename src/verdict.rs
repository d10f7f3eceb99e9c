// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Acknowledgment Verdicts
//!
//! Handlers report what happened to a message by returning a `Verdict`. They never ack or
//! nack deliveries themselves; the consumer translates the verdict into the matching
//! broker call.

/// Outcome of handling one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    /// Processed; remove the message from the queue.
    Accept,
    /// Rejected; drop it or route it to the dead-letter exchange.
    RejectDiscard,
    /// Rejected; put it back on the queue for redelivery.
    RejectRequeue,
}
