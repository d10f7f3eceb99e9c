// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Message Consumer
//!
//! Processing of a single delivery: decode the payload, hand it to the subscription's
//! handler and settle the delivery according to the returned `Verdict`. Every delivery
//! that reaches `consume` is settled exactly once, including when decoding fails or the
//! handler panics.

use crate::{
    broker::{Acknowledger, Delivery},
    codec::Decoder,
    errors::AmqpError,
    handler::Handler,
    otel,
    verdict::Verdict,
};
use futures_util::FutureExt;
use opentelemetry::{
    global::BoxedTracer,
    trace::{Span, Status},
};
use std::{borrow::Cow, panic::AssertUnwindSafe};
use tracing::{debug, error, warn};

/// What a subscription does with deliveries it cannot hand over to its handler.
///
/// Both verdicts default to `Verdict::RejectDiscard`: the delivery is routed to the
/// queue's dead-letter exchange instead of being redelivered forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailurePolicy {
    /// Verdict applied when the payload does not decode.
    pub on_decode_failure: Verdict,
    /// Verdict applied when the decoder or the handler panics.
    pub on_handler_panic: Verdict,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        FailurePolicy {
            on_decode_failure: Verdict::RejectDiscard,
            on_handler_panic: Verdict::RejectDiscard,
        }
    }
}

/// How a delivery left the decode and handle stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Handled(Verdict),
    Undecodable,
    Panicked,
}

impl Outcome {
    /// Resolves the verdict to settle the delivery with.
    ///
    /// # Parameters
    /// * `policy` - The subscription's failure policy, used for undecodable deliveries
    ///   and panics
    ///
    /// # Returns
    /// The handler's own verdict, or the policy verdict matching the failure
    pub(crate) fn verdict(self, policy: FailurePolicy) -> Verdict {
        match self {
            Outcome::Handled(verdict) => verdict,
            Outcome::Undecodable => policy.on_decode_failure,
            Outcome::Panicked => policy.on_handler_panic,
        }
    }

    /// Span status recorded for the delivery: `Ok` only when the handler accepted it.
    pub(crate) fn span_status(self) -> Status {
        let description = match self {
            Outcome::Handled(Verdict::Accept) => return Status::Ok,
            Outcome::Handled(_) => "msg rejected by handler",
            Outcome::Undecodable => "failure to decode msg",
            Outcome::Panicked => "panic while processing msg",
        };

        Status::Error {
            description: Cow::from(description),
        }
    }
}

/// Performs the broker call matching `verdict` on a single delivery.
///
/// | verdict         | call                                |
/// |-----------------|-------------------------------------|
/// | `Accept`        | `ack(multiple = false)`             |
/// | `RejectDiscard` | `nack(multiple = false, requeue = false)` |
/// | `RejectRequeue` | `nack(multiple = false, requeue = true)`  |
///
/// # Parameters
/// * `acker` - The delivery's acknowledgment handle
/// * `verdict` - The verdict to apply
///
/// # Returns
/// Ok(()) once the broker call is sent, or the ack/nack error
pub(crate) async fn acknowledge(acker: &dyn Acknowledger, verdict: Verdict) -> Result<(), AmqpError> {
    match verdict {
        Verdict::Accept => acker.ack(false).await,
        Verdict::RejectDiscard => acker.nack(false, false).await,
        Verdict::RejectRequeue => acker.nack(false, true).await,
    }
}

/// Decodes, handles and settles one delivery.
///
/// Decoding and the handler call share one `catch_unwind` boundary, so a panic in either
/// is turned into `FailurePolicy::on_handler_panic` and the delivery is still settled.
///
/// # Parameters
/// * `tracer` - OpenTelemetry tracer for the delivery span
/// * `delivery` - The delivery to process
/// * `queue` - Name of the queue the delivery came from, used in logs
/// * `decoder` - Turns the payload into the handler's input
/// * `handler` - Application logic producing the verdict
/// * `policy` - Verdicts for undecodable payloads and panics
///
/// # Returns
/// The verdict that was applied, or the error of the settle call
pub(crate) async fn consume<T, D, H>(
    tracer: &BoxedTracer,
    delivery: Delivery,
    queue: &str,
    decoder: &D,
    handler: &H,
    policy: FailurePolicy,
) -> Result<Verdict, AmqpError>
where
    T: Send + 'static,
    D: Decoder<T>,
    H: Handler<T>,
{
    let (_ctx, mut span) = otel::new_span(&delivery.properties, tracer, &delivery.routing_key);

    debug!(
        queue,
        redelivered = delivery.redelivered,
        "received: {} - exchange: {}",
        delivery.routing_key,
        delivery.exchange,
    );

    let data = &delivery.data;
    let processed = AssertUnwindSafe(async move {
        match decoder.decode(data) {
            Ok(msg) => Ok(handler.handle(msg).await),
            Err(err) => Err(err),
        }
    })
    .catch_unwind()
    .await;

    let outcome = match processed {
        Ok(Ok(verdict)) => Outcome::Handled(verdict),
        Ok(Err(err)) => {
            warn!(
                error = err.to_string(),
                queue,
                delivery_tag = delivery.delivery_tag,
                "failure to decode msg"
            );
            span.record_error(&err);
            Outcome::Undecodable
        }
        Err(_) => {
            error!(queue, delivery_tag = delivery.delivery_tag, "panic while processing msg");
            Outcome::Panicked
        }
    };

    span.set_status(outcome.span_status());
    let verdict = outcome.verdict(policy);

    if let Err(err) = acknowledge(delivery.acker.as_ref(), verdict).await {
        span.record_error(&err);
        span.set_status(Status::Error {
            description: Cow::from("error to settle msg"),
        });
        return Err(err);
    }

    debug!(queue, ?verdict, "message settled");
    Ok(verdict)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{broker::MockAcknowledger, codec::JsonDecoder, handler::SyncHandler};
    use lapin::BasicProperties;
    use opentelemetry::global;
    use serde::Deserialize;
    use std::sync::{Arc, Mutex};

    /// Settle calls observed on a delivery.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) enum Settled {
        Ack { multiple: bool },
        Nack { multiple: bool, requeue: bool },
    }

    #[derive(Clone, Default)]
    pub(crate) struct RecordingAcker {
        pub(crate) calls: Arc<Mutex<Vec<Settled>>>,
    }

    #[async_trait::async_trait]
    impl Acknowledger for RecordingAcker {
        async fn ack(&self, multiple: bool) -> Result<(), AmqpError> {
            self.calls.lock().unwrap().push(Settled::Ack { multiple });
            Ok(())
        }

        async fn nack(&self, multiple: bool, requeue: bool) -> Result<(), AmqpError> {
            self.calls
                .lock()
                .unwrap()
                .push(Settled::Nack { multiple, requeue });
            Ok(())
        }
    }

    pub(crate) fn delivery(data: &[u8], acker: impl Acknowledger + 'static) -> Delivery {
        Delivery {
            delivery_tag: 1,
            exchange: "peril_topic".to_owned(),
            routing_key: "army_moves.bob".to_owned(),
            redelivered: false,
            properties: BasicProperties::default(),
            data: data.to_vec(),
            acker: Box::new(acker),
        }
    }

    #[derive(Debug, Deserialize)]
    struct PlayingState {
        is_paused: bool,
    }

    async fn run(data: &[u8], handler: impl Handler<PlayingState>, policy: FailurePolicy) -> (Result<Verdict, AmqpError>, Vec<Settled>) {
        let acker = RecordingAcker::default();
        let calls = acker.calls.clone();

        let result = consume(
            &global::tracer("test"),
            delivery(data, acker),
            "pause.bob",
            &JsonDecoder,
            &handler,
            policy,
        )
        .await;

        let calls = calls.lock().unwrap().clone();
        (result, calls)
    }

    #[tokio::test]
    async fn accept_acks_single_delivery() {
        let mut acker = MockAcknowledger::new();
        acker
            .expect_ack()
            .withf(|multiple| !*multiple)
            .times(1)
            .returning(|_| Ok(()));
        acker.expect_nack().never();

        assert!(acknowledge(&acker, Verdict::Accept).await.is_ok());
    }

    #[tokio::test]
    async fn reject_discard_nacks_without_requeue() {
        let mut acker = MockAcknowledger::new();
        acker.expect_ack().never();
        acker
            .expect_nack()
            .withf(|multiple, requeue| !*multiple && !*requeue)
            .times(1)
            .returning(|_, _| Ok(()));

        assert!(acknowledge(&acker, Verdict::RejectDiscard).await.is_ok());
    }

    #[tokio::test]
    async fn reject_requeue_nacks_with_requeue() {
        let mut acker = MockAcknowledger::new();
        acker.expect_ack().never();
        acker
            .expect_nack()
            .withf(|multiple, requeue| !*multiple && *requeue)
            .times(1)
            .returning(|_, _| Ok(()));

        assert!(acknowledge(&acker, Verdict::RejectRequeue).await.is_ok());
    }

    #[tokio::test]
    async fn settle_failure_is_reported() {
        let mut acker = MockAcknowledger::new();
        acker
            .expect_ack()
            .times(1)
            .returning(|_| Err(AmqpError::AckMessageError));

        assert_eq!(
            acknowledge(&acker, Verdict::Accept).await,
            Err(AmqpError::AckMessageError)
        );
    }

    #[tokio::test]
    async fn handler_verdict_settles_delivery_once() {
        let handler = SyncHandler(|state: PlayingState| {
            if state.is_paused {
                Verdict::Accept
            } else {
                Verdict::RejectRequeue
            }
        });

        let (result, calls) = run(br#"{"is_paused": true}"#, handler, FailurePolicy::default()).await;

        assert_eq!(result, Ok(Verdict::Accept));
        assert_eq!(calls, vec![Settled::Ack { multiple: false }]);
    }

    #[tokio::test]
    async fn undecodable_payload_follows_policy_without_calling_handler() {
        let handler = SyncHandler(|_: PlayingState| -> Verdict { panic!("handler must not run") });

        let (result, calls) = run(b"not json", handler, FailurePolicy::default()).await;

        assert_eq!(result, Ok(Verdict::RejectDiscard));
        assert_eq!(
            calls,
            vec![Settled::Nack {
                multiple: false,
                requeue: false
            }]
        );
    }

    #[tokio::test]
    async fn decode_failure_policy_can_requeue() {
        let handler = SyncHandler(|_: PlayingState| -> Verdict { panic!("handler must not run") });
        let policy = FailurePolicy {
            on_decode_failure: Verdict::RejectRequeue,
            ..FailurePolicy::default()
        };

        let (result, calls) = run(br#"{"is_paused": "yes"}"#, handler, policy).await;

        assert_eq!(result, Ok(Verdict::RejectRequeue));
        assert_eq!(
            calls,
            vec![Settled::Nack {
                multiple: false,
                requeue: true
            }]
        );
    }

    #[tokio::test]
    async fn decoder_panic_is_converted_to_policy_verdict() {
        let acker = RecordingAcker::default();
        let calls = acker.calls.clone();
        let decoder = |_: &[u8]| -> Result<PlayingState, AmqpError> { panic!("corrupt decoder state") };
        let handler = SyncHandler(|_: PlayingState| -> Verdict { panic!("handler must not run") });
        let policy = FailurePolicy {
            on_handler_panic: Verdict::Accept,
            ..FailurePolicy::default()
        };

        let result = consume(
            &global::tracer("test"),
            delivery(br#"{"is_paused": true}"#, acker),
            "pause.bob",
            &decoder,
            &handler,
            policy,
        )
        .await;

        assert_eq!(result, Ok(Verdict::Accept));
        assert_eq!(*calls.lock().unwrap(), vec![Settled::Ack { multiple: false }]);
    }

    #[test]
    fn outcome_resolves_policy_verdicts() {
        let policy = FailurePolicy {
            on_decode_failure: Verdict::RejectRequeue,
            on_handler_panic: Verdict::Accept,
        };

        assert_eq!(Outcome::Handled(Verdict::RejectDiscard).verdict(policy), Verdict::RejectDiscard);
        assert_eq!(Outcome::Undecodable.verdict(policy), Verdict::RejectRequeue);
        assert_eq!(Outcome::Panicked.verdict(policy), Verdict::Accept);
    }

    #[test]
    fn only_accepted_deliveries_mark_span_ok() {
        assert_eq!(Outcome::Handled(Verdict::Accept).span_status(), Status::Ok);

        for outcome in [
            Outcome::Handled(Verdict::RejectDiscard),
            Outcome::Handled(Verdict::RejectRequeue),
            Outcome::Undecodable,
            Outcome::Panicked,
        ] {
            assert!(
                matches!(outcome.span_status(), Status::Error { .. }),
                "{outcome:?} must mark the span as error"
            );
        }
    }

    #[test]
    fn span_error_describes_the_failure() {
        assert_eq!(
            Outcome::Undecodable.span_status(),
            Status::Error {
                description: Cow::from("failure to decode msg")
            }
        );
        assert_eq!(
            Outcome::Panicked.span_status(),
            Status::Error {
                description: Cow::from("panic while processing msg")
            }
        );
    }

    #[tokio::test]
    async fn handler_panic_is_converted_to_policy_verdict() {
        let handler = SyncHandler(|_: PlayingState| -> Verdict { panic!("boom") });
        let policy = FailurePolicy {
            on_handler_panic: Verdict::RejectRequeue,
            ..FailurePolicy::default()
        };

        let (result, calls) = run(br#"{"is_paused": false}"#, handler, policy).await;

        assert_eq!(result, Ok(Verdict::RejectRequeue));
        assert_eq!(
            calls,
            vec![Settled::Nack {
                multiple: false,
                requeue: true
            }]
        );
    }
}
