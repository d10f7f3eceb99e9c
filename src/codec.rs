// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Payload Decoders
//!
//! The consumer does not care how a payload is encoded, only that something turns the
//! raw bytes into the handler's input type. Two decoders are provided: `JsonDecoder` for
//! structured text and `BinaryDecoder` for bincode-encoded objects. Any
//! `Fn(&[u8]) -> Result<T, AmqpError>` closure works as a decoder as well.

use crate::errors::AmqpError;
use bincode::Options;
use serde::de::DeserializeOwned;

/// Turns a raw delivery body into a `T`.
///
/// Implementations must be all-or-nothing: either the whole payload is turned into a
/// `T`, or an `AmqpError::DecodeError` is returned. A partially populated value is never
/// handed to the handler.
pub trait Decoder<T>: Send + Sync + 'static {
    /// Decodes one delivery body.
    ///
    /// # Parameters
    /// * `data` - The raw bytes of the delivery
    ///
    /// # Returns
    /// The decoded value, or `AmqpError::DecodeError` describing why the bytes do not
    /// form a valid `T`
    fn decode(&self, data: &[u8]) -> Result<T, AmqpError>;
}

impl<T, F> Decoder<T> for F
where
    F: Fn(&[u8]) -> Result<T, AmqpError> + Send + Sync + 'static,
{
    fn decode(&self, data: &[u8]) -> Result<T, AmqpError> {
        self(data)
    }
}

/// Decodes JSON payloads with `serde_json`.
///
/// Malformed documents, documents whose shape does not match `T` and documents followed
/// by trailing characters are all rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder;

impl<T: DeserializeOwned> Decoder<T> for JsonDecoder {
    fn decode(&self, data: &[u8]) -> Result<T, AmqpError> {
        serde_json::from_slice(data).map_err(|err| AmqpError::DecodeError(err.to_string()))
    }
}

/// Decodes bincode payloads.
///
/// The byte layout is the one produced by `bincode::serialize` (fixed-width integers,
/// little endian). Unlike `bincode::deserialize`, the whole payload must be consumed:
/// bytes left over after `T` is read make the payload invalid, so a message of a longer
/// type never decodes silently into a shorter one.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryDecoder;

impl<T: DeserializeOwned> Decoder<T> for BinaryDecoder {
    fn decode(&self, data: &[u8]) -> Result<T, AmqpError> {
        bincode::DefaultOptions::new()
            .with_fixint_encoding()
            .reject_trailing_bytes()
            .deserialize(data)
            .map_err(|err| AmqpError::DecodeError(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct ArmyMove {
        player: String,
        units: Vec<u32>,
        to_location: String,
    }

    fn army_move() -> ArmyMove {
        ArmyMove {
            player: "bob".to_owned(),
            units: vec![1, 2, 3],
            to_location: "asia".to_owned(),
        }
    }

    #[test]
    fn json_decodes_what_serde_json_encodes() {
        let data = serde_json::to_vec(&army_move()).unwrap();

        let decoded: ArmyMove = JsonDecoder.decode(&data).unwrap();

        assert_eq!(decoded, army_move());
    }

    #[test]
    fn binary_decodes_what_bincode_encodes() {
        let data = bincode::serialize(&army_move()).unwrap();

        let decoded: ArmyMove = BinaryDecoder.decode(&data).unwrap();

        assert_eq!(decoded, army_move());
    }

    #[test]
    fn json_rejects_malformed_and_mismatched_payloads() {
        let malformed: Result<ArmyMove, _> = JsonDecoder.decode(b"{\"player\": ");
        let mismatched: Result<ArmyMove, _> = JsonDecoder.decode(br#"{"player": 7}"#);

        assert!(matches!(malformed, Err(AmqpError::DecodeError(_))));
        assert!(matches!(mismatched, Err(AmqpError::DecodeError(_))));
    }

    #[test]
    fn binary_rejects_truncated_payload() {
        let data = bincode::serialize(&army_move()).unwrap();

        let truncated: Result<ArmyMove, _> = BinaryDecoder.decode(&data[..data.len() - 2]);
        let empty: Result<ArmyMove, _> = BinaryDecoder.decode(&[]);

        assert!(matches!(truncated, Err(AmqpError::DecodeError(_))));
        assert!(matches!(empty, Err(AmqpError::DecodeError(_))));
    }

    #[test]
    fn binary_rejects_trailing_bytes() {
        let mut data = bincode::serialize("bob").unwrap();
        data.extend_from_slice(b"garbage-after-message");

        let decoded: Result<String, _> = BinaryDecoder.decode(&data);

        assert!(matches!(decoded, Err(AmqpError::DecodeError(_))));
    }

    #[test]
    fn binary_rejects_payload_of_a_longer_type() {
        #[derive(Debug, Serialize)]
        struct GameLog {
            username: String,
            message: String,
        }

        #[derive(Debug, Deserialize)]
        struct Player {
            #[allow(dead_code)]
            name: String,
        }

        let data = bincode::serialize(&GameLog {
            username: "bob".to_owned(),
            message: "hi".to_owned(),
        })
        .unwrap();

        let decoded: Result<Player, _> = BinaryDecoder.decode(&data);

        assert!(matches!(decoded, Err(AmqpError::DecodeError(_))));
    }

    #[test]
    fn json_rejects_trailing_characters() {
        let decoded: Result<String, _> = JsonDecoder.decode(b"\"bob\" garbage");

        assert!(matches!(decoded, Err(AmqpError::DecodeError(_))));
    }

    #[test]
    fn closures_are_decoders() {
        let decoder = |data: &[u8]| {
            std::str::from_utf8(data)
                .map(str::to_owned)
                .map_err(|err| AmqpError::DecodeError(err.to_string()))
        };

        assert_eq!(decoder.decode(b"pause").unwrap(), "pause");
        assert!(decoder.decode(&[0xff, 0xfe]).is_err());
    }
}
