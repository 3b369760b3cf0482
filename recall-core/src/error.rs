//! Error types for RECALL operations

use crate::{BackendKind, SerializationFormat};
use thiserror::Error;

/// Storage backend errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Backend {backend} unavailable: {reason}")]
    BackendUnavailable { backend: BackendKind, reason: String },

    #[error("I/O failure in {backend} backend: {reason}")]
    Io { backend: BackendKind, reason: String },

    #[error("Corrupt entry {key} in {backend} backend: {reason}")]
    Corrupt {
        backend: BackendKind,
        key: String,
        reason: String,
    },
}

/// Cache key derivation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("Argument {parameter} is not serializable: {reason}")]
    ArgumentNotSerializable { parameter: String, reason: String },

    #[error("Canonical argument encoding failed: {reason}")]
    CanonicalEncoding { reason: String },
}

/// Value codec errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Failed to encode value as {format}: {reason}")]
    Encode {
        format: SerializationFormat,
        reason: String,
    },

    #[error("Failed to decode {format} value: {reason}")]
    Decode {
        format: SerializationFormat,
        reason: String,
    },
}

/// Change-tracking target resolution errors.
///
/// None of these reach a caller; each one degrades the dependency to the
/// entity-level token.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TrackingError {
    #[error("Parameter not found: {parameter}")]
    ParameterNotFound { parameter: String },

    #[error("Property path did not resolve: {path}")]
    PropertyNotFound { path: String },

    #[error("Property path resolved to an empty value: {path}")]
    EmptyValue { path: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Malformed change-tracking spec '{spec}': {reason}")]
    MalformedChangeTracking { spec: String, reason: String },

    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },
}

/// Master error type for all RECALL errors.
#[derive(Debug, Clone, Error)]
pub enum RecallError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Key error: {0}")]
    Key(#[from] KeyError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Tracking error: {0}")]
    Tracking(#[from] TrackingError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for RECALL operations.
pub type RecallResult<T> = Result<T, RecallError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display_unavailable() {
        let err = StorageError::BackendUnavailable {
            backend: BackendKind::Disk,
            reason: "permission denied".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("disk"));
        assert!(msg.contains("permission denied"));
    }

    #[test]
    fn test_key_error_display() {
        let err = KeyError::ArgumentNotSerializable {
            parameter: "filter".to_string(),
            reason: "key must be a string".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("filter"));
        assert!(msg.contains("key must be a string"));
    }

    #[test]
    fn test_codec_error_display() {
        let err = CodecError::Decode {
            format: SerializationFormat::Binary,
            reason: "unexpected end of input".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("binary"));
        assert!(msg.contains("unexpected end of input"));
    }

    #[test]
    fn test_config_error_display_malformed_tracking() {
        let err = ConfigError::MalformedChangeTracking {
            spec: "Order:CustomerId".to_string(),
            reason: "missing '='".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Order:CustomerId"));
        assert!(msg.contains("missing '='"));
    }

    #[test]
    fn test_recall_error_from_variants() {
        let storage = RecallError::from(StorageError::Io {
            backend: BackendKind::Disk,
            reason: "disk full".to_string(),
        });
        assert!(matches!(storage, RecallError::Storage(_)));

        let key = RecallError::from(KeyError::CanonicalEncoding {
            reason: "bad".to_string(),
        });
        assert!(matches!(key, RecallError::Key(_)));

        let codec = RecallError::from(CodecError::Encode {
            format: SerializationFormat::Json,
            reason: "bad".to_string(),
        });
        assert!(matches!(codec, RecallError::Codec(_)));

        let tracking = RecallError::from(TrackingError::ParameterNotFound {
            parameter: "id".to_string(),
        });
        assert!(matches!(tracking, RecallError::Tracking(_)));

        let config = RecallError::from(ConfigError::Parse {
            reason: "bad".to_string(),
        });
        assert!(matches!(config, RecallError::Config(_)));
    }
}
