//! Shared serialization helpers.

use alloy::primitives::U256;
use serde::{Deserialize, Deserializer, Serializer};

/// Serialize a `U256` as a decimal string.
///
/// Position token ids routinely exceed 53 bits; JSON numbers silently lose
/// precision there, so every `U256` crossing the persistence or wire
/// boundary travels as a decimal string.
pub fn serialize_u256_dec<S>(val: &U256, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    s.serialize_str(&val.to_string())
}

/// Deserialize a `U256` from a decimal string.
pub fn deserialize_u256_dec<'de, D>(d: D) -> Result<U256, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(d)?;
    raw.parse::<U256>().map_err(serde::de::Error::custom)
}

/// `#[serde(with = "u256_dec")]` module form of the decimal-string codec.
pub mod u256_dec {
    pub use super::deserialize_u256_dec as deserialize;
    pub use super::serialize_u256_dec as serialize;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Wrapper {
        #[serde(with = "u256_dec")]
        id: U256,
    }

    #[test]
    fn test_u256_decimal_string_roundtrip() {
        // A value that would lose precision as a JSON f64.
        let w = Wrapper {
            id: U256::from(9_007_199_254_740_993_u64),
        };
        let json = serde_json::to_string(&w).unwrap();
        assert_eq!(json, r#"{"id":"9007199254740993"}"#);

        let back: Wrapper = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, w.id);
    }

    #[test]
    fn test_u256_rejects_garbage() {
        assert!(serde_json::from_str::<Wrapper>(r#"{"id":"12x34"}"#).is_err());
        assert!(serde_json::from_str::<Wrapper>(r#"{"id":""}"#).is_err());
        // Numbers must travel as strings.
        assert!(serde_json::from_str::<Wrapper>(r#"{"id":42}"#).is_err());
    }
}
