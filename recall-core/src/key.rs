//! Deterministic cache key derivation.

use crate::{CacheKey, Invocation, KeyError, SerializationFormat};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Byte inserted between the identity prefix and the argument bytes so that
/// `("ab", "c")` and `("a", "bc")` never hash the same input.
const PREFIX_SEPARATOR: u8 = 0;

/// Turns an operation identity plus canonical argument bytes into a
/// fixed-format [`CacheKey`].
///
/// The digest is the first 128 bits of SHA-256 rendered as a hyphenated GUID,
/// so every hashed key is 36 characters. Nothing machine-local enters the
/// hash; keys are stable across processes and restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyDeriver {
    hash_prefix_in_key: bool,
}

impl KeyDeriver {
    /// With `hash_prefix_in_key == false` the readable prefix is prepended to
    /// the digest as `prefix_digest`.
    pub fn new(hash_prefix_in_key: bool) -> Self {
        Self { hash_prefix_in_key }
    }

    pub fn hash_prefix_in_key(&self) -> bool {
        self.hash_prefix_in_key
    }

    /// Derive a key from an identity and already-canonicalized argument bytes.
    pub fn derive_key(&self, identity: &str, canonical_args: &[u8]) -> CacheKey {
        let mut hasher = Sha256::new();
        hasher.update(identity.as_bytes());
        hasher.update([PREFIX_SEPARATOR]);
        hasher.update(canonical_args);
        let digest = hasher.finalize();

        let mut truncated = [0u8; 16];
        truncated.copy_from_slice(&digest[..16]);
        let rendered = Uuid::from_bytes(truncated).hyphenated().to_string();

        if self.hash_prefix_in_key {
            CacheKey::new(rendered)
        } else {
            CacheKey::new(format!("{}_{}", identity, rendered))
        }
    }

    /// Derive the key for an invocation, serializing its arguments in `format`.
    pub fn derive_for(
        &self,
        invocation: &Invocation,
        format: SerializationFormat,
    ) -> Result<CacheKey, KeyError> {
        let arguments = invocation.canonical_arguments()?;
        let bytes = format
            .encode(&arguments)
            .map_err(|e| KeyError::CanonicalEncoding {
                reason: e.to_string(),
            })?;
        Ok(self.derive_key(&invocation.key_prefix(), &bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const GUID_LEN: usize = 36;

    #[test]
    fn test_hashed_key_is_guid_shaped() {
        let key = KeyDeriver::new(true).derive_key("Orders.find", b"[42]");
        assert_eq!(key.as_str().len(), GUID_LEN);
        assert!(Uuid::parse_str(key.as_str()).is_ok());
    }

    #[test]
    fn test_readable_prefix() {
        let key = KeyDeriver::new(false).derive_key("Orders.find", b"[42]");
        let (prefix, digest) = key.as_str().split_once('_').unwrap();
        assert_eq!(prefix, "Orders.find");
        assert_eq!(digest.len(), GUID_LEN);
        assert_eq!(digest, KeyDeriver::new(true).derive_key("Orders.find", b"[42]").as_str());
    }

    #[test]
    fn test_prefix_boundary_is_unambiguous() {
        let deriver = KeyDeriver::new(true);
        assert_ne!(deriver.derive_key("ab", b"c"), deriver.derive_key("a", b"bc"));
    }

    #[test]
    fn test_derive_for_invocation() {
        let deriver = KeyDeriver::new(true);
        let first = Invocation::new("Orders", "find").arg("id", &42).arg("open", &true);
        let same = Invocation::new("Orders", "find").arg("id", &42).arg("open", &true);
        let other = Invocation::new("Orders", "find").arg("id", &43).arg("open", &true);

        let format = SerializationFormat::Json;
        assert_eq!(
            deriver.derive_for(&first, format).unwrap(),
            deriver.derive_for(&same, format).unwrap()
        );
        assert_ne!(
            deriver.derive_for(&first, format).unwrap(),
            deriver.derive_for(&other, format).unwrap()
        );
    }

    #[test]
    fn test_derive_for_respects_prefix_override() {
        let deriver = KeyDeriver::new(false);
        let invocation = Invocation::new("Orders", "find")
            .with_key_prefix("orders-v2")
            .arg("id", &1);
        let key = deriver
            .derive_for(&invocation, SerializationFormat::Binary)
            .unwrap();
        assert!(key.as_str().starts_with("orders-v2_"));
    }

    #[test]
    fn test_derive_for_fails_on_unserializable_argument() {
        use std::collections::HashMap;

        // Non-string map keys cannot become JSON objects
        let mut by_pair = HashMap::new();
        by_pair.insert((1, 2), "x");
        let invocation = Invocation::new("Grid", "lookup").arg("cells", &by_pair);

        let result = KeyDeriver::new(true).derive_for(&invocation, SerializationFormat::Json);
        assert!(matches!(result, Err(KeyError::ArgumentNotSerializable { .. })));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_derive_key_is_deterministic(
            identity in "[A-Za-z]{1,12}\\.[A-Za-z]{1,12}",
            args in proptest::collection::vec(any::<u8>(), 0..64),
            hashed in any::<bool>(),
        ) {
            let deriver = KeyDeriver::new(hashed);
            prop_assert_eq!(deriver.derive_key(&identity, &args), deriver.derive_key(&identity, &args));
        }

        #[test]
        fn prop_single_argument_change_changes_key(
            identity in "[A-Za-z]{1,12}\\.[A-Za-z]{1,12}",
            a in any::<i64>(),
            b in any::<i64>(),
        ) {
            prop_assume!(a != b);
            let deriver = KeyDeriver::new(true);
            let left = Invocation::new("Svc", identity.clone()).arg("x", &a);
            let right = Invocation::new("Svc", identity).arg("x", &b);
            prop_assert_ne!(
                deriver.derive_for(&left, SerializationFormat::Json).unwrap(),
                deriver.derive_for(&right, SerializationFormat::Json).unwrap()
            );
        }
    }
}
