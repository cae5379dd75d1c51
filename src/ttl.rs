//! `Cache-Control` freshness parsing.

/// Extracts the freshness lifetime in seconds from a raw `Cache-Control`
/// value.
///
/// Directives are matched as substrings; no full grammar is parsed. A
/// value containing `no-cache` or `private` yields zero, as does an
/// absent or unrecognized value, letting the configured minimum TTL take
/// over. `s-maxage` wins over `max-age` when both are present.
pub(crate) fn freshness_seconds(value: Option<&str>) -> u64 {
    let Some(value) = value else {
        return 0;
    };
    if value.contains("no-cache") || value.contains("private") {
        return 0;
    }
    directive_seconds(value, "s-maxage")
        .or_else(|| directive_seconds(value, "max-age"))
        .unwrap_or(0)
}

/// Finds `{directive}=<digits>` within `value` and parses the integer.
fn directive_seconds(value: &str, directive: &str) -> Option<u64> {
    let rest = &value[value.find(directive)? + directive.len()..];
    let rest = rest.strip_prefix('=')?;
    let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    rest[..digits].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_header_yields_zero() {
        assert_eq!(freshness_seconds(None), 0);
    }

    #[test]
    fn uncacheable_directives_yield_zero() {
        assert_eq!(freshness_seconds(Some("no-cache")), 0);
        assert_eq!(freshness_seconds(Some("private, max-age=3600")), 0);
        assert_eq!(freshness_seconds(Some("no-cache, no-store")), 0);
    }

    #[test]
    fn unrecognized_value_yields_zero() {
        assert_eq!(freshness_seconds(Some("unknown")), 0);
        assert_eq!(freshness_seconds(Some("public")), 0);
        assert_eq!(freshness_seconds(Some("max-age=abc")), 0);
    }

    #[test]
    fn max_age_is_parsed() {
        assert_eq!(freshness_seconds(Some("max-age=3600")), 3600);
        assert_eq!(freshness_seconds(Some("public, max-age=604800")), 604_800);
        assert_eq!(freshness_seconds(Some("max-age=0")), 0);
    }

    #[test]
    fn s_maxage_takes_precedence() {
        assert_eq!(freshness_seconds(Some("s-maxage=60, max-age=3600")), 60);
        assert_eq!(freshness_seconds(Some("max-age=3600, s-maxage=60")), 60);
        assert_eq!(freshness_seconds(Some("s-maxage=90")), 90);
    }
}
