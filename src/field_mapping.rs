//! Pure per-field cleanup functions applied while reshaping legacy rows.
//!
//! Every function here is total: malformed or missing input degrades to an
//! absent value, never a panic or an error.

/// Countries whose records are always filed under `South America`, whatever
/// the raw continent column says. Spellings are the ones found in the legacy
/// data.
const SOUTH_AMERICAN_COUNTRIES: [&str; 3] = ["Brasilien", "Chile", "Costa Rica"];

/// Mirror a rating on the 1-5 scale (`6 - old`), so that a legacy
/// "1 is best" value becomes a "5 is best" value.
///
/// Non-numeric or empty input yields `None`. Applied to housing quality.
pub fn invert_rating(raw: &str) -> Option<i64> {
    let value: i64 = raw.trim().parse().ok()?;
    Some(6 - value)
}

/// Parse a stringly-typed boolean column.
///
/// Only case-variants of `true` and `false` are recognized; anything else,
/// including the empty string, is `None`.
pub fn parse_bool(raw: &str) -> Option<bool> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("true") {
        Some(true)
    } else if trimmed.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Strip fragment noise from a URL column.
///
/// Legacy rows sometimes hold several values glued together with `#`. When a
/// `#` is present, the first segment starting with `http` wins; if no segment
/// does, the first segment wins. Strings without `#` pass through unchanged.
pub fn clean_url(url: &str) -> &str {
    if !url.contains('#') {
        return url;
    }
    url.split('#')
        .find(|segment| segment.starts_with("http"))
        .unwrap_or_else(|| url.split('#').next().unwrap_or(url))
}

/// Correct the continent label for a record.
///
/// A handful of countries were filed under the wrong continent in the legacy
/// data and are forced to `South America`. The catch-all label `Amerika`
/// becomes `North America`. Everything else passes through verbatim.
pub fn reclassify_continent<'a>(
    country: Option<&str>,
    continent: Option<&'a str>,
) -> Option<&'a str> {
    if let Some(country) = country {
        if SOUTH_AMERICAN_COUNTRIES.contains(&country) {
            return Some("South America");
        }
    }
    match continent {
        Some("Amerika") => Some("North America"),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invert_rating_mirrors_scale() {
        assert_eq!(invert_rating("1"), Some(5));
        assert_eq!(invert_rating("2"), Some(4));
        assert_eq!(invert_rating("3"), Some(3));
        assert_eq!(invert_rating("4"), Some(2));
        assert_eq!(invert_rating("5"), Some(1));
    }

    #[test]
    fn test_invert_rating_is_involutive() {
        for rating in 1..=5 {
            let once = invert_rating(&rating.to_string()).unwrap();
            let twice = invert_rating(&once.to_string()).unwrap();
            assert_eq!(twice, rating);
        }
    }

    #[test]
    fn test_invert_rating_rejects_non_numeric() {
        assert_eq!(invert_rating(""), None);
        assert_eq!(invert_rating("abc"), None);
        assert_eq!(invert_rating("3.5"), None);
    }

    #[test]
    fn test_invert_rating_accepts_padded_input() {
        assert_eq!(invert_rating(" 2 "), Some(4));
    }

    #[test]
    fn test_parse_bool_true_variants() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("True"), Some(true));
        assert_eq!(parse_bool("TRUE"), Some(true));
    }

    #[test]
    fn test_parse_bool_false_variants() {
        assert_eq!(parse_bool("false"), Some(false));
        assert_eq!(parse_bool("False"), Some(false));
        assert_eq!(parse_bool("FALSE"), Some(false));
    }

    #[test]
    fn test_parse_bool_rejects_everything_else() {
        assert_eq!(parse_bool(""), None);
        assert_eq!(parse_bool("yes"), None);
        assert_eq!(parse_bool("1"), None);
        assert_eq!(parse_bool("truth"), None);
    }

    #[test]
    fn test_clean_url_prefers_http_segment() {
        assert_eq!(clean_url("http://a#http://b"), "http://a");
        assert_eq!(clean_url("junk#http://real.example"), "http://real.example");
    }

    #[test]
    fn test_clean_url_falls_back_to_first_segment() {
        assert_eq!(clean_url("foo#bar"), "foo");
    }

    #[test]
    fn test_clean_url_leaves_plain_urls_alone() {
        assert_eq!(clean_url("http://example.com/page"), "http://example.com/page");
        assert_eq!(clean_url(""), "");
    }

    #[test]
    fn test_reclassify_continent_country_override_wins() {
        assert_eq!(
            reclassify_continent(Some("Chile"), Some("Amerika")),
            Some("South America")
        );
        assert_eq!(
            reclassify_continent(Some("Brasilien"), Some("Europa")),
            Some("South America")
        );
        assert_eq!(
            reclassify_continent(Some("Costa Rica"), None),
            Some("South America")
        );
    }

    #[test]
    fn test_reclassify_continent_amerika_becomes_north_america() {
        assert_eq!(
            reclassify_continent(Some("Kanada"), Some("Amerika")),
            Some("North America")
        );
    }

    #[test]
    fn test_reclassify_continent_passthrough() {
        assert_eq!(
            reclassify_continent(Some("Japan"), Some("Asien")),
            Some("Asien")
        );
        assert_eq!(reclassify_continent(Some("Japan"), None), None);
        assert_eq!(reclassify_continent(None, None), None);
    }
}
