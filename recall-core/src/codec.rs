//! Serialization formats for cached values and argument lists.

use crate::CodecError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Wire format used to turn results (and argument lists) into bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializationFormat {
    /// `serde_json`; human-readable, tolerant of schema drift.
    #[default]
    Json,
    /// `bincode`; compact, requires identical types on both sides.
    Binary,
}

impl SerializationFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SerializationFormat::Json => "json",
            SerializationFormat::Binary => "binary",
        }
    }

    /// Encode a value in this format.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        let encoded = match self {
            SerializationFormat::Json => serde_json::to_vec(value).map_err(|e| e.to_string()),
            SerializationFormat::Binary => bincode::serialize(value).map_err(|e| e.to_string()),
        };
        encoded.map_err(|reason| CodecError::Encode {
            format: *self,
            reason,
        })
    }

    /// Decode a value previously produced by [`Self::encode`].
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        let decoded = match self {
            SerializationFormat::Json => serde_json::from_slice(bytes).map_err(|e| e.to_string()),
            SerializationFormat::Binary => bincode::deserialize(bytes).map_err(|e| e.to_string()),
        };
        decoded.map_err(|reason| CodecError::Decode {
            format: *self,
            reason,
        })
    }
}

impl fmt::Display for SerializationFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SerializationFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(SerializationFormat::Json),
            "binary" | "bincode" => Ok(SerializationFormat::Binary),
            other => Err(format!("Invalid serialization format: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Invoice {
        number: u32,
        lines: Vec<String>,
        paid: Option<bool>,
    }

    fn sample() -> Invoice {
        Invoice {
            number: 7,
            lines: vec!["widget".to_string(), "gizmo".to_string()],
            paid: Some(false),
        }
    }

    #[test]
    fn test_json_round_trip() {
        let bytes = SerializationFormat::Json.encode(&sample()).unwrap();
        let decoded: Invoice = SerializationFormat::Json.decode(&bytes).unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn test_binary_round_trip() {
        let bytes = SerializationFormat::Binary.encode(&sample()).unwrap();
        let decoded: Invoice = SerializationFormat::Binary.decode(&bytes).unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn test_decode_garbage_is_codec_error() {
        let result: Result<Invoice, _> = SerializationFormat::Json.decode(b"not json");
        assert!(matches!(
            result,
            Err(CodecError::Decode {
                format: SerializationFormat::Json,
                ..
            })
        ));
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("JSON".parse(), Ok(SerializationFormat::Json));
        assert_eq!("bincode".parse(), Ok(SerializationFormat::Binary));
        assert!("xml".parse::<SerializationFormat>().is_err());
    }
}
