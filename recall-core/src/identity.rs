//! Identity types for cached entries and dependency tokens

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Separates the entity name from the property name inside a token.
pub const PROPERTY_DELIMITER: char = ':';

/// Separates the property name from the property value inside a token.
pub const VALUE_DELIMITER: char = '=';

// ============================================================================
// CACHE KEY
// ============================================================================

/// Fixed-format key addressing a single cached result.
///
/// Produced by [`crate::KeyDeriver`]; the orchestrator never builds one by hand.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Wrap an already-derived key string.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// VALIDATION TOKEN
// ============================================================================

/// Correlation key between a data-change event and the cache entries that
/// depend on it.
///
/// Either `Entity` or `Entity:Property=Value`. Equality is plain string
/// equality; no structural comparison of the underlying entity happens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationToken(String);

impl ValidationToken {
    /// Token covering every record of an entity type.
    pub fn for_entity(entity: &str) -> Self {
        Self(entity.trim().to_string())
    }

    /// Token covering the records of `entity` whose `property` equals `value`.
    pub fn for_property(entity: &str, property: &str, value: &str) -> Self {
        Self(format!(
            "{}{}{}{}{}",
            entity.trim(),
            PROPERTY_DELIMITER,
            property.trim(),
            VALUE_DELIMITER,
            value
        ))
    }

    /// Compose a token from an optional property/value pair.
    ///
    /// Falls back to the entity-level token unless both a property name and a
    /// non-blank value are supplied.
    pub fn resolve(entity: &str, property: Option<&str>, value: Option<&str>) -> Self {
        match (property, value) {
            (Some(property), Some(value))
                if !property.trim().is_empty() && !value.trim().is_empty() =>
            {
                Self::for_property(entity, property, value)
            }
            _ => Self::for_entity(entity),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The entity name this token belongs to.
    pub fn entity(&self) -> &str {
        self.0
            .split_once(PROPERTY_DELIMITER)
            .map(|(entity, _)| entity)
            .unwrap_or(&self.0)
    }

    /// Whether this token is narrowed to a property value.
    pub fn is_property_scoped(&self) -> bool {
        self.0.contains(PROPERTY_DELIMITER)
    }
}

impl fmt::Display for ValidationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// BACKEND KIND
// ============================================================================

/// Identifies which storage backend holds an entry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// No backend; every operation is a no-op.
    #[default]
    Null,
    /// In-process memory.
    Memory,
    /// Local disk (LMDB).
    Disk,
    /// Out-of-process shared key/value store supplied by the host application.
    Distributed,
}

impl BackendKind {
    /// Every backend kind, in declaration order.
    pub const ALL: [BackendKind; 4] = [
        BackendKind::Null,
        BackendKind::Memory,
        BackendKind::Disk,
        BackendKind::Distributed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Null => "null",
            BackendKind::Memory => "memory",
            BackendKind::Disk => "disk",
            BackendKind::Distributed => "distributed",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, BackendKind::Null)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = BackendKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "null" | "none" => Ok(BackendKind::Null),
            "memory" => Ok(BackendKind::Memory),
            "disk" => Ok(BackendKind::Disk),
            "distributed" => Ok(BackendKind::Distributed),
            _ => Err(BackendKindParseError(s.to_string())),
        }
    }
}

/// Error when parsing an invalid backend name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendKindParseError(pub String);

impl fmt::Display for BackendKindParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid backend kind: {}", self.0)
    }
}

impl std::error::Error for BackendKindParseError {}

// ============================================================================
// EXPIRY
// ============================================================================

/// Expiry attached to a stored entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expiry {
    /// No automatic expiry. Backends may still evict under capacity pressure.
    #[default]
    Never,
    /// Relative time-to-live from the moment of the write.
    After(Duration),
    /// Absolute expiry instant.
    At(Timestamp),
}

impl Expiry {
    /// Expiry for a configured lifespan; a zero lifespan means no expiry.
    pub fn from_lifespan(lifespan: Duration) -> Self {
        if lifespan.is_zero() {
            Expiry::Never
        } else {
            Expiry::After(lifespan)
        }
    }

    /// Resolve to an absolute deadline relative to `now`.
    pub fn deadline(&self, now: Timestamp) -> Option<Timestamp> {
        match self {
            Expiry::Never => None,
            Expiry::After(ttl) => {
                let ttl = chrono::Duration::from_std(*ttl).unwrap_or(chrono::Duration::MAX);
                Some(now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC))
            }
            Expiry::At(at) => Some(*at),
        }
    }
}
