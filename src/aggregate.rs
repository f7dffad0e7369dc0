//! Aggregation & schema unification.
//!
//! Turns the raw records of every source and query into one homogeneous table of
//! [`UnifiedRecord`]s, then drops rows with neither a title nor an abstract.

use crate::config::{PEER_REVIEWED_PUBLISHERS, REGION_NAMES};
use crate::error::Result;
use crate::funnel::{Checkpoint, FunnelCounters};
use crate::normalize::{
    clean_abstract, collapse_whitespace, is_peer_reviewed_publisher, mentions_region,
    normalize_doi, normalize_text,
};
use crate::record::{RawRecord, UnifiedRecord, CANONICAL_FIELDS};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::RangeInclusive;
use tracing::{debug, info};

/// Years outside this range are treated as parse noise.
const YEAR_RANGE: RangeInclusive<i64> = 1000..=2100;

/// Source name used when a record arrives without one.
const UNKNOWN_SOURCE: &str = "unknown";

/// Unify, type and filter a batch of raw records.
///
/// Writes `by_source`, `after_aggregation` and `after_nonempty_filter` to the funnel.
pub fn aggregate(raw: Vec<RawRecord>, funnel: &mut FunnelCounters) -> Result<Vec<UnifiedRecord>> {
    let extra_columns: BTreeSet<String> = raw
        .iter()
        .flat_map(|r| r.keys())
        .filter(|k| !CANONICAL_FIELDS.contains(&k.as_str()))
        .cloned()
        .collect();

    debug!(extra = ?extra_columns, "Unified schema extra columns");

    let unified: Vec<UnifiedRecord> = raw
        .iter()
        .map(|r| unify_record(r, &extra_columns))
        .collect();

    let mut by_source: BTreeMap<String, usize> = BTreeMap::new();
    for record in &unified {
        *by_source.entry(record.source.clone()).or_default() += 1;
    }
    funnel.record_sources(by_source)?;
    funnel.record(Checkpoint::AfterAggregation, unified.len())?;

    let before = unified.len();
    let kept: Vec<UnifiedRecord> = unified.into_iter().filter(has_content).collect();
    info!(
        kept = kept.len(),
        dropped = before - kept.len(),
        "Dropped records without title or abstract"
    );
    funnel.record(Checkpoint::AfterNonemptyFilter, kept.len())?;

    Ok(kept)
}

/// A record is usable for dedup only when it has a title or an abstract.
pub fn has_content(record: &UnifiedRecord) -> bool {
    !record.title.is_empty() || !record.abstract_text.is_empty()
}

/// Map one raw record onto the canonical shape. Never fails.
pub fn unify_record(raw: &RawRecord, extra_columns: &BTreeSet<String>) -> UnifiedRecord {
    let text = |key: &str| collapse_whitespace(&normalize_text(raw.get_str(key)));

    let source = Some(text("source"))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| UNKNOWN_SOURCE.to_string());
    let title = text("title");
    let abstract_text = collapse_whitespace(&clean_abstract(raw.get_str("abstract")));
    let publisher = text("publisher");

    let likely_peer_reviewed = is_peer_reviewed_publisher(Some(&publisher), PEER_REVIEWED_PUBLISHERS)
        || flag(raw.get("peer_reviewed"))
        || flag(raw.get("likely_peer_reviewed"));

    let scan_text = format!("{} {}", title, abstract_text);
    let mentions_europe =
        mentions_region(Some(&scan_text), REGION_NAMES) || flag(raw.get("mentions_europe"));

    let extra = extra_columns
        .iter()
        .map(|name| (name.clone(), raw.get(name).map(render_extra).unwrap_or_default()))
        .collect();

    UnifiedRecord {
        source,
        title,
        abstract_text,
        authors: text("authors"),
        year: raw.get("year").and_then(parse_year),
        doi: normalize_doi(raw.get_str("doi")),
        url: text("url"),
        publisher,
        journal: text("journal"),
        likely_peer_reviewed,
        mentions_europe,
        extra,
    }
}

/// Best-effort year coercion: integers, integral floats and numeric strings.
pub fn parse_year(value: &Value) -> Option<i32> {
    let year = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().and_then(integral_f64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral_f64))
        }
        _ => None,
    }?;

    if YEAR_RANGE.contains(&year) {
        i32::try_from(year).ok()
    } else {
        None
    }
}

fn integral_f64(f: f64) -> Option<i64> {
    (f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15).then_some(f as i64)
}

fn flag(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn render_extra(value: &Value) -> String {
    match value {
        Value::String(s) => collapse_whitespace(&normalize_text(Some(s))),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
