//! Payload serialization.
//!
//! A [`Serializer`] turns call arguments and replies into body bytes and
//! back. The default is the schema-bound binary encoding: no field names or
//! type tags on the wire, so both ends must agree on the message types,
//! which is the contract for trusted intra-datacenter peers.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::errors::{ProtocolError, Result};

/// A value that can cross the wire as a call argument or reply.
///
/// Blanket-implemented for every owned serde type with a zero state. The
/// zero state is what a reply slot holds before a response body is decoded
/// into it - and what it returns to when the body is empty.
pub trait Message: Serialize + DeserializeOwned + Default + Send + 'static {}

impl<T> Message for T where T: Serialize + DeserializeOwned + Default + Send + 'static {}

/// Payload codec selected at client and server construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Serializer {
    /// Compact schema-bound binary encoding.
    #[default]
    Bincode,
    /// Self-describing JSON, for debugging peers.
    Json,
}

impl Serializer {
    /// Encode `message`; `None` encodes to the empty byte string.
    pub fn marshal<M: Message>(self, message: Option<&M>) -> Result<Vec<u8>> {
        let Some(message) = message else {
            return Ok(Vec::new());
        };
        match self {
            Self::Bincode => {
                bincode::serialize(message).map_err(|e| ProtocolError::IncompatiblePayload(e))
            }
            Self::Json => serde_json::to_vec(message)
                .map_err(|e| ProtocolError::IncompatiblePayload(Box::new(e))),
        }
    }

    /// Decode `data` into `slot`.
    ///
    /// Zero bytes of input reset the slot to its [`Default`] state.
    pub fn unmarshal<M: Message>(self, data: &[u8], slot: &mut M) -> Result<()> {
        if data.is_empty() {
            *slot = M::default();
            return Ok(());
        }
        *slot = match self {
            Self::Bincode => {
                bincode::deserialize(data).map_err(|e| ProtocolError::IncompatiblePayload(e))?
            }
            Self::Json => serde_json::from_slice(data)
                .map_err(|e| ProtocolError::IncompatiblePayload(Box::new(e)))?,
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
    struct Sample {
        a: i32,
        b: i32,
        label: String,
    }

    fn sample() -> Sample {
        Sample { a: 20, b: 5, label: "arith".to_string() }
    }

    #[test]
    fn bincode_round_trip() {
        let serializer = Serializer::Bincode;
        let bytes = serializer.marshal(Some(&sample())).unwrap();
        let mut slot = Sample::default();
        serializer.unmarshal(&bytes, &mut slot).unwrap();
        assert_eq!(slot, sample());
    }

    #[test]
    fn json_round_trip() {
        let serializer = Serializer::Json;
        let bytes = serializer.marshal(Some(&sample())).unwrap();
        let mut slot = Sample::default();
        serializer.unmarshal(&bytes, &mut slot).unwrap();
        assert_eq!(slot, sample());
    }

    #[test]
    fn none_marshals_to_the_empty_byte_string() {
        for serializer in [Serializer::Bincode, Serializer::Json] {
            assert!(serializer.marshal::<Sample>(None).unwrap().is_empty());
        }
    }

    #[test]
    fn empty_input_resets_the_slot_to_its_zero_state() {
        for serializer in [Serializer::Bincode, Serializer::Json] {
            let mut slot = sample();
            serializer.unmarshal(&[], &mut slot).unwrap();
            assert_eq!(slot, Sample::default(), "empty input must zero the slot");

            let mut fresh = Sample::default();
            serializer.unmarshal(&[], &mut fresh).unwrap();
            assert_eq!(fresh, Sample::default());
        }
    }

    #[test]
    fn undecodable_input_is_incompatible() {
        // A truncated bincode buffer for a struct with a string field.
        let mut slot = Sample::default();
        let err = Serializer::Bincode.unmarshal(&[0xff], &mut slot).unwrap_err();
        assert!(matches!(err, ProtocolError::IncompatiblePayload(_)));

        let err = Serializer::Json.unmarshal(b"{not json", &mut slot).unwrap_err();
        assert!(matches!(err, ProtocolError::IncompatiblePayload(_)));
    }

    #[test]
    fn default_serializer_is_bincode() {
        assert_eq!(Serializer::default(), Serializer::Bincode);
    }
}
