//! Byte-level serialization boundary.
//!
//! Configurations cross the persistence boundary through a
//! [`ConfigurationCodec`]: deterministic, round-trip-exact encode/decode.
//! The default [`JsonCodec`] covers any serde type; hosts with a schema of
//! their own plug in a different implementation.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::TrellisError;

/// Encode/decode contract for one configuration type. Implementations must
/// be deterministic and round-trip-exact.
pub trait ConfigurationCodec<C> {
    fn encode(&self, value: &C) -> Result<Vec<u8>, TrellisError>;
    fn decode(&self, bytes: &[u8]) -> Result<C, TrellisError>;
}

/// Serde-JSON codec, the default for any `Serialize + DeserializeOwned`
/// configuration.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl<C: Serialize + DeserializeOwned> ConfigurationCodec<C> for JsonCodec {
    fn encode(&self, value: &C) -> Result<Vec<u8>, TrellisError> {
        serde_json::to_vec(value).map_err(TrellisError::codec)
    }

    fn decode(&self, bytes: &[u8]) -> Result<C, TrellisError> {
        serde_json::from_slice(bytes).map_err(TrellisError::codec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    enum Screen {
        List,
        Details { id: u64 },
    }

    #[test]
    fn json_codec_round_trips_exactly() {
        let codec = JsonCodec;
        let value = Screen::Details { id: 42 };
        let bytes = codec.encode(&value).unwrap();
        let decoded: Screen = codec.decode(&bytes).unwrap();
        assert_eq!(decoded, value);
        // Deterministic: same input, same bytes.
        assert_eq!(bytes, codec.encode(&value).unwrap());
    }

    #[test]
    fn decode_failure_surfaces_as_codec_error() {
        let codec = JsonCodec;
        let result: Result<Screen, _> = codec.decode(b"not json");
        assert!(matches!(result, Err(TrellisError::Codec(_))));
    }
}
