//! RECALL Core - Keys, Tokens and Configuration
//!
//! Pure data types and pure functions shared by every other crate: cache key
//! derivation, validation tokens, change-tracking specs, codecs and the
//! configuration model. Nothing in here performs I/O.

pub mod codec;
pub mod config;
pub mod error;
pub mod identity;
pub mod invocation;
pub mod key;
pub mod tracking;

pub use codec::SerializationFormat;
pub use config::{
    CachePolicy, CacheSettings, DiskSettings, EffectivePolicy, MetricsSettings, TargetSettings,
};
pub use error::{
    CodecError, ConfigError, KeyError, RecallError, RecallResult, StorageError, TrackingError,
};
pub use identity::{
    BackendKind, BackendKindParseError, CacheKey, Expiry, Timestamp, ValidationToken,
    PROPERTY_DELIMITER, VALUE_DELIMITER,
};
pub use invocation::{render_token_value, Argument, Invocation, PathResolver, PATH_SEPARATOR};
pub use key::KeyDeriver;
pub use tracking::{ChangeTrackingSpec, PropertyBinding, TrackedTarget, ENTRY_SEPARATOR};
