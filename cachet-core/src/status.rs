//! Decision-outcome tag for responses.

use http::HeaderValue;

/// Whether a response was served from cache, from the origin, or stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheStatus {
    /// Served from a stored entry (fresh hit or 304 merge).
    Hit,
    /// Served from the origin.
    #[default]
    Miss,
    /// Served from a stored entry past its freshness lifetime.
    Stale,
}

impl CacheStatus {
    /// Header value recorded when debug annotation is enabled.
    pub fn as_header_value(self) -> HeaderValue {
        match self {
            CacheStatus::Hit => HeaderValue::from_static("HIT"),
            CacheStatus::Miss => HeaderValue::from_static("MISS"),
            CacheStatus::Stale => HeaderValue::from_static("STALE"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_values() {
        assert_eq!(CacheStatus::Hit.as_header_value(), "HIT");
        assert_eq!(CacheStatus::Miss.as_header_value(), "MISS");
        assert_eq!(CacheStatus::Stale.as_header_value(), "STALE");
    }
}
