//! Request fingerprinting.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Fingerprint identifying a cached entry.
///
/// Two requests with equal fingerprints are cache-equivalent. The default
/// derivation hashes the full request URI, so the key is stable across
/// processes and usable directly as a backend map key.
///
/// # Example
///
/// ```
/// use cachet_core::CacheKey;
///
/// let key = CacheKey::of("https://api.example/users?page=1");
/// assert_eq!(key, CacheKey::of("https://api.example/users?page=1"));
/// assert_ne!(key, CacheKey::of("https://api.example/users?page=2"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// Fingerprints a request by its full URI.
    ///
    /// Returns the lowercase hex SHA-256 digest of the URI string. Total:
    /// any string yields a key.
    pub fn of(uri: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(uri.as_bytes());
        CacheKey(hex::encode(hasher.finalize()))
    }

    /// Returns the fingerprint as a hex string.
    pub fn as_str(&self) -> &str {
        &self.0
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_deterministic() {
        let first = CacheKey::of("https://example.com/a");
        let second = CacheKey::of("https://example.com/a");
        assert_eq!(first, second);
    }

    #[test]
    fn key_differs_per_uri() {
        assert_ne!(
            CacheKey::of("https://example.com/a"),
            CacheKey::of("https://example.com/b")
        );
    }

    #[test]
    fn key_is_lowercase_hex() {
        let key = CacheKey::of("https://example.com/a?q=1");
        assert_eq!(key.as_str().len(), 64);
        assert!(
            key.as_str()
                .chars()
                .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        );
    }
}
