//! Storage backend contract and tracked entity marker.
//!
//! Backends store opaque bytes. Encoding results, deriving keys and tracking
//! dependencies all happen above this layer, so a backend only has to honor
//! presence, absence and expiry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recall_core::{BackendKind, CacheKey, Expiry, RecallResult, Timestamp};

/// Marker trait for entity types whose changes invalidate cached results.
///
/// The entity name is the first component of every validation token for
/// this type, so it must match the name used in change-tracking specs.
pub trait TrackedEntity {
    fn entity_name() -> &'static str;
}

/// Uniform key/value contract every cache backend implements.
///
/// Implementations must be thread-safe and must treat removing or probing an
/// absent key as a normal outcome, not an error.
///
/// # Expiry
///
/// `get` and `exists` never report an entry whose expiry has passed.
/// `Expiry::Never` only disables automatic expiry; a backend may still
/// evict under capacity pressure.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Which configured backend this is, used to route dependency entries.
    fn kind(&self) -> BackendKind;

    /// Fetch the stored bytes for `key`.
    async fn get(&self, key: &CacheKey) -> RecallResult<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous entry.
    async fn set(&self, key: &CacheKey, value: Vec<u8>, expiry: Expiry) -> RecallResult<()>;

    /// Remove `key`. Returns whether an entry was present.
    async fn remove(&self, key: &CacheKey) -> RecallResult<bool>;

    /// Whether a live entry exists for `key`.
    async fn exists(&self, key: &CacheKey) -> RecallResult<bool>;

    /// Drop every entry.
    async fn reset(&self) -> RecallResult<()>;
}

/// Marker value for "no expiry" in the encoded header.
const NO_EXPIRY: i64 = i64::MIN;

/// Length of the encoded expiry header.
pub const ENTRY_HEADER_LEN: usize = 8;

/// A payload together with its absolute expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub payload: Vec<u8>,
    pub expires_at: Option<Timestamp>,
}

impl StoredEntry {
    pub fn new(payload: Vec<u8>, expiry: Expiry, now: Timestamp) -> Self {
        Self {
            payload,
            expires_at: expiry.deadline(now),
        }
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Encode as `[expiry_millis: i64 LE][payload]`.
    pub fn encode(&self) -> Vec<u8> {
        let millis = self
            .expires_at
            .map(|at| at.timestamp_millis())
            .unwrap_or(NO_EXPIRY);

        let mut bytes = Vec::with_capacity(ENTRY_HEADER_LEN + self.payload.len());
        bytes.extend_from_slice(&millis.to_le_bytes());
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    /// Decode bytes produced by [`Self::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self, String> {
        if bytes.len() < ENTRY_HEADER_LEN {
            return Err(format!(
                "entry is {} bytes, shorter than the {} byte header",
                bytes.len(),
                ENTRY_HEADER_LEN
            ));
        }

        let header: [u8; ENTRY_HEADER_LEN] = bytes[..ENTRY_HEADER_LEN]
            .try_into()
            .map_err(|_| "Invalid expiry header".to_string())?;
        let millis = i64::from_le_bytes(header);

        let expires_at = if millis == NO_EXPIRY {
            None
        } else {
            Some(
                DateTime::<Utc>::from_timestamp_millis(millis)
                    .ok_or_else(|| format!("expiry {} out of range", millis))?,
            )
        };

        Ok(Self {
            payload: bytes[ENTRY_HEADER_LEN..].to_vec(),
            expires_at,
        })
    }
}

/// Hit/miss counters for one metric scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache probes.
    pub requests: u64,
    /// Number of probes answered from the cache.
    pub hits: u64,
    /// Number of probes that fell through to the operation.
    pub misses: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use std::time::Duration;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            requests: 100,
            hits: 80,
            misses: 20,
        };
        assert!((stats.hit_rate() - 0.8).abs() < 0.001);

        let empty_stats = CacheStats::default();
        assert!((empty_stats.hit_rate() - 0.0).abs() < 0.001);
    }

    #[test]
    fn test_entry_without_expiry_never_expires() {
        let now = Utc::now();
        let entry = StoredEntry::new(b"v".to_vec(), Expiry::Never, now);
        assert_eq!(entry.expires_at, None);
        assert!(!entry.is_expired(now + ChronoDuration::days(3650)));
    }

    #[test]
    fn test_entry_expires_at_deadline() {
        let now = Utc::now();
        let entry = StoredEntry::new(b"v".to_vec(), Expiry::After(Duration::from_secs(5)), now);
        assert!(!entry.is_expired(now));
        assert!(entry.is_expired(now + ChronoDuration::seconds(5)));
    }

    #[test]
    fn test_entry_encoding_keeps_millisecond_expiry() {
        let at = DateTime::<Utc>::from_timestamp_millis(1_700_000_000_123).unwrap();
        let entry = StoredEntry::new(b"payload".to_vec(), Expiry::At(at), Utc::now());

        let decoded = StoredEntry::decode(&entry.encode()).unwrap();
        assert_eq!(decoded, entry);

        let forever = StoredEntry::new(Vec::new(), Expiry::Never, Utc::now());
        assert_eq!(StoredEntry::decode(&forever.encode()).unwrap(), forever);
    }

    #[test]
    fn test_entry_decode_rejects_short_input() {
        assert!(StoredEntry::decode(&[1, 2, 3]).is_err());
    }
}
