//! `Cache-Control` directive parsing.

use http::HeaderMap;
use http::header::CACHE_CONTROL;

/// Parsed `Cache-Control` directives.
///
/// Requests and responses share one structure; each side reads the fields
/// that apply to it. The header is parsed once into this fixed shape so the
/// decision logic never probes a header bag.
///
/// Unknown directives and unparseable arguments are ignored: a malformed
/// header degrades to "directive absent", never to a failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControl {
    /// `max-age=N` in seconds.
    pub max_age: Option<i64>,
    /// `max-stale` was present, with or without an argument.
    pub max_stale: bool,
    /// Argument of `max-stale=N`; `None` means any staleness is accepted.
    pub max_stale_seconds: Option<i64>,
    /// `min-fresh=N` in seconds.
    pub min_fresh: Option<i64>,
    /// `no-cache` directive.
    pub no_cache: bool,
    /// `no-store` directive.
    pub no_store: bool,
    /// `only-if-cached` directive.
    pub only_if_cached: bool,
    /// `must-revalidate` directive.
    pub must_revalidate: bool,
    /// `private` directive.
    pub private: bool,
    /// `stale-while-revalidate=N` window in seconds (RFC 5861).
    pub stale_while_revalidate: Option<i64>,
    /// `stale-if-error=N` window in seconds (RFC 5861).
    pub stale_if_error: Option<i64>,
}

impl CacheControl {
    /// Parses every `Cache-Control` header in `headers`.
    ///
    /// Later occurrences of a valued directive overwrite earlier ones;
    /// boolean directives accumulate.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut parsed = CacheControl::default();
        for value in headers.get_all(CACHE_CONTROL) {
            let Ok(value) = value.to_str() else { continue };
            for directive in value.split(',') {
                parsed.apply(directive.trim());
            }
        }
        parsed
    }

    fn apply(&mut self, directive: &str) {
        let (name, argument) = match directive.split_once('=') {
            Some((name, argument)) => (name.trim(), Some(argument.trim().trim_matches('"'))),
            None => (directive, None),
        };
        match name.to_ascii_lowercase().as_str() {
            "max-age" => self.max_age = parse_seconds(argument),
            "max-stale" => {
                self.max_stale = true;
                self.max_stale_seconds = parse_seconds(argument);
            }
            "min-fresh" => self.min_fresh = parse_seconds(argument),
            "no-cache" => self.no_cache = true,
            "no-store" => self.no_store = true,
            "only-if-cached" => self.only_if_cached = true,
            "must-revalidate" => self.must_revalidate = true,
            "private" => self.private = true,
            "stale-while-revalidate" => self.stale_while_revalidate = parse_seconds(argument),
            "stale-if-error" => self.stale_if_error = parse_seconds(argument),
            _ => {}
        }
    }
}

fn parse_seconds(argument: Option<&str>) -> Option<i64> {
    argument?.parse().ok().filter(|seconds| *seconds >= 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn parse(value: &'static str) -> CacheControl {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static(value));
        CacheControl::from_headers(&headers)
    }

    #[test]
    fn parses_valued_directives() {
        let control = parse("max-age=60, stale-while-revalidate=30, stale-if-error=3600");
        assert_eq!(control.max_age, Some(60));
        assert_eq!(control.stale_while_revalidate, Some(30));
        assert_eq!(control.stale_if_error, Some(3600));
    }

    #[test]
    fn parses_boolean_directives() {
        let control = parse("no-store, no-cache, must-revalidate, private, only-if-cached");
        assert!(control.no_store);
        assert!(control.no_cache);
        assert!(control.must_revalidate);
        assert!(control.private);
        assert!(control.only_if_cached);
    }

    #[test]
    fn max_stale_without_argument_is_unbounded() {
        let control = parse("max-stale");
        assert!(control.max_stale);
        assert_eq!(control.max_stale_seconds, None);
    }

    #[test]
    fn max_stale_with_argument() {
        let control = parse("max-stale=120, min-fresh=5");
        assert!(control.max_stale);
        assert_eq!(control.max_stale_seconds, Some(120));
        assert_eq!(control.min_fresh, Some(5));
    }

    #[test]
    fn directive_names_are_case_insensitive() {
        let control = parse("Max-Age=10, NO-STORE");
        assert_eq!(control.max_age, Some(10));
        assert!(control.no_store);
    }

    #[test]
    fn quoted_arguments_are_unwrapped() {
        let control = parse("max-age=\"45\"");
        assert_eq!(control.max_age, Some(45));
    }

    #[test]
    fn malformed_directives_are_ignored() {
        let control = parse("max-age=banana, min-fresh=-3, frobnicate, =7");
        assert_eq!(control.max_age, None);
        assert_eq!(control.min_fresh, None);
        assert_eq!(control, CacheControl::default());
    }

    #[test]
    fn multiple_header_values_accumulate() {
        let mut headers = HeaderMap::new();
        headers.append(CACHE_CONTROL, HeaderValue::from_static("max-age=60"));
        headers.append(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        let control = CacheControl::from_headers(&headers);
        assert_eq!(control.max_age, Some(60));
        assert!(control.no_cache);
    }

    #[test]
    fn absent_header_yields_default() {
        assert_eq!(
            CacheControl::from_headers(&HeaderMap::new()),
            CacheControl::default()
        );
    }
}
