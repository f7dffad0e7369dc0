//! Field normalization shared by every source.
//!
//! All functions here are total: malformed or missing input (`None`) degrades
//! to an empty string or `false`, never to an error.

use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag regex"));

static NUMERIC_ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#(?:[xX]([0-9A-Fa-f]{1,6})|([0-9]{1,7}));").expect("entity regex"));

static DOI_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^https?://(?:dx\.)?doi\.org/").expect("doi prefix regex"));

static NON_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s]").expect("non-word regex"));

/// Named entities decoded before tag stripping. `&amp;` goes last so that
/// `&amp;lt;` decodes once, to the literal text `&lt;`.
const NAMED_ENTITIES: [(&str, &str); 9] = [
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&nbsp;", " "),
    ("&quot;", "\""),
    ("&apos;", "'"),
    ("&ndash;", "\u{2013}"),
    ("&mdash;", "\u{2014}"),
    ("&hellip;", "\u{2026}"),
    ("&amp;", "&"),
];

/// Mojibake left behind when a UTF-8 no-break space was decoded as Latin-1.
const MISENCODED_NBSP: char = '\u{00C2}';

/// NFKC-compose and trim. Non-string input yields `""`.
pub fn normalize_text(s: Option<&str>) -> String {
    match s {
        Some(s) => s.nfkc().collect::<String>().trim().to_string(),
        None => String::new(),
    }
}

/// Collapse every whitespace run to a single space.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decode HTML entities, strip tags, drop the mis-encoding artifact, then
/// apply [`normalize_text`].
pub fn clean_abstract(s: Option<&str>) -> String {
    let Some(s) = s else {
        return String::new();
    };

    let unescaped = decode_html_entities(s);
    let stripped = TAG_RE.replace_all(&unescaped, " ");
    let repaired = stripped.replace(MISENCODED_NBSP, " ");
    normalize_text(Some(&repaired))
}

fn decode_html_entities(s: &str) -> String {
    let decoded = NUMERIC_ENTITY_RE.replace_all(s, |caps: &regex::Captures| {
        let code = match (caps.get(1), caps.get(2)) {
            (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
            (_, Some(dec)) => dec.as_str().parse::<u32>().ok(),
            _ => None,
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    });

    let mut result = decoded.into_owned();
    for (entity, replacement) in NAMED_ENTITIES {
        result = result.replace(entity, replacement);
    }
    result
}

/// Lowercase DOI with any `http(s)://(dx.)doi.org/` prefixes removed.
pub fn normalize_doi(s: Option<&str>) -> String {
    let Some(s) = s else {
        return String::new();
    };

    let mut current = s.trim();
    while let Some(m) = DOI_PREFIX_RE.find(current) {
        current = current[m.end()..].trim();
    }
    current.to_lowercase().trim().to_string()
}

/// Title key for exact-match dedup: lowercase words separated by single spaces,
/// punctuation removed.
pub fn normalize_title_for_exact_match(s: Option<&str>) -> String {
    let lowered = normalize_text(s).to_lowercase();
    let words_only = NON_WORD_RE.replace_all(&lowered, " ");
    collapse_whitespace(&words_only)
}

/// Case-insensitive substring scan for any of `region_names`.
pub fn mentions_region(text: Option<&str>, region_names: &[&str]) -> bool {
    contains_any_fragment(text, region_names)
}

/// Case-insensitive substring match of a publisher against the allow-list.
pub fn is_peer_reviewed_publisher(name: Option<&str>, allow_list: &[&str]) -> bool {
    contains_any_fragment(name, allow_list)
}

fn contains_any_fragment(haystack: Option<&str>, fragments: &[&str]) -> bool {
    let Some(haystack) = haystack.filter(|h| !h.is_empty()) else {
        return false;
    };
    let haystack = haystack.to_lowercase();
    fragments
        .iter()
        .filter(|f| !f.is_empty())
        .any(|f| haystack.contains(&f.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PEER_REVIEWED_PUBLISHERS, REGION_NAMES};
    use proptest::prelude::*;

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text(Some("  ﬁeld study  ")), "field study");
        assert_eq!(normalize_text(Some("Ｅｕｒｏｐｅ")), "Europe");
        assert_eq!(normalize_text(None), "");
    }

    #[test]
    fn test_clean_abstract() {
        assert_eq!(
            clean_abstract(Some("<jats:p>Youth &amp; labour&nbsp;markets</jats:p>")),
            "Youth & labour markets"
        );
        assert_eq!(
            clean_abstract(Some("&lt;p&gt;Escaped markup&lt;/p&gt;")),
            "Escaped markup"
        );
        assert_eq!(clean_abstract(Some("caf&#233; &#x41;")), "café A");
        assert_eq!(clean_abstract(Some("labour\u{00C2}market")), "labour market");
        assert_eq!(clean_abstract(None), "");
    }

    #[test]
    fn test_normalize_doi() {
        assert_eq!(normalize_doi(Some("https://doi.org/10.1234/ABC")), "10.1234/abc");
        assert_eq!(normalize_doi(Some("http://dx.doi.org/10.1234/x")), "10.1234/x");
        assert_eq!(normalize_doi(Some(" HTTPS://DOI.ORG/10.5/Y ")), "10.5/y");
        assert_eq!(normalize_doi(Some("10.1/Z")), "10.1/z");
        assert_eq!(normalize_doi(None), "");
    }

    #[test]
    fn test_normalize_title_for_exact_match() {
        assert_eq!(
            normalize_title_for_exact_match(Some("Early School Leaving in Europe")),
            "early school leaving in europe"
        );
        assert_eq!(
            normalize_title_for_exact_match(Some("early   school-leaving  in europe!!")),
            "early school leaving in europe"
        );
        assert_eq!(normalize_title_for_exact_match(Some("?!")), "");
        assert_eq!(normalize_title_for_exact_match(None), "");
    }

    #[test]
    fn test_mentions_region() {
        assert!(mentions_region(Some("NEET youth in SPAIN"), REGION_NAMES));
        assert!(!mentions_region(Some("NEET youth in Chile"), REGION_NAMES));
        assert!(!mentions_region(Some(""), REGION_NAMES));
        assert!(!mentions_region(None, REGION_NAMES));
    }

    #[test]
    fn test_mentions_region_covers_wider_europe() {
        assert!(mentions_region(Some("NEET youth in Turkey"), REGION_NAMES));
        assert!(mentions_region(Some("NEET youth in the UK"), REGION_NAMES));
        assert!(mentions_region(Some("Youth policy across the EEA"), REGION_NAMES));
        assert!(mentions_region(Some("Early school leaving in Europe"), REGION_NAMES));
        // Short fragments match inside words too.
        assert!(mentions_region(Some("A neutral labour market model"), REGION_NAMES));
    }

    #[test]
    fn test_is_peer_reviewed_publisher() {
        assert!(is_peer_reviewed_publisher(
            Some("Springer Science and Business Media LLC"),
            PEER_REVIEWED_PUBLISHERS
        ));
        assert!(is_peer_reviewed_publisher(Some("ELSEVIER BV"), PEER_REVIEWED_PUBLISHERS));
        assert!(!is_peer_reviewed_publisher(Some("Self-published"), PEER_REVIEWED_PUBLISHERS));
        assert!(!is_peer_reviewed_publisher(Some("Macmillan Learning"), PEER_REVIEWED_PUBLISHERS));
        assert!(!is_peer_reviewed_publisher(Some("MDPI AG"), PEER_REVIEWED_PUBLISHERS));
        assert!(is_peer_reviewed_publisher(Some("Walter de Gruyter GmbH"), PEER_REVIEWED_PUBLISHERS));
        assert!(!is_peer_reviewed_publisher(None, PEER_REVIEWED_PUBLISHERS));
    }

    proptest! {
        #[test]
        fn prop_normalize_doi_idempotent(s in "(https?://(dx\\.)?doi\\.org/)?[ -~]{0,40}") {
            let once = normalize_doi(Some(&s));
            prop_assert_eq!(normalize_doi(Some(&once)), once);
        }

        #[test]
        fn prop_title_key_has_no_punctuation_or_double_spaces(s in "[ -~\t\néüß]{0,60}") {
            let key = normalize_title_for_exact_match(Some(&s));
            prop_assert!(!key.contains("  "));
            prop_assert!(!key.starts_with(' ') && !key.ends_with(' '));
            prop_assert!(key.chars().all(|c| c.is_alphanumeric() || c == '_' || c == ' '));
        }
    }
}
