//! Export/view projection.
//!
//! Writes the full-schema table, the minimal screening table and the funnel JSON.
//! Tables are UTF-8 with a byte-order mark and quote every non-numeric field.

use crate::error::Result;
use crate::funnel::FunnelReport;
use crate::record::{MinimalRecord, UnifiedRecord, CANONICAL_FIELDS, MINIMAL_COLUMNS};
use regex::Regex;
use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{info, warn};
use url::Url;

static DOI_SHAPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^10\.\d{4,9}/\S+").expect("doi shape regex"));

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Cell caps for the minimal table. Common CSV readers reject cells past 128k.
pub const MAX_ABSTRACT_CHARS: usize = 120_000;
pub const MAX_TITLE_CHARS: usize = 8_000;

/// File names inside a run's output folder.
pub const FULL_TABLE_FILE: &str = "records_full.csv";
pub const MINIMAL_TABLE_FILE: &str = "records_minimal.csv";
pub const FUNNEL_FILE: &str = "funnel.json";

/// True when the DOI looks like `10.<registrant>/<suffix>`.
pub fn has_doi_shape(doi: &str) -> bool {
    DOI_SHAPE_RE.is_match(doi)
}

/// True for absolute `http`/`https` URLs with a host.
pub fn is_web_url(candidate: &str) -> bool {
    Url::parse(candidate)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

/// Post-dedup usability gate for the minimal view.
pub fn is_usable(record: &UnifiedRecord) -> bool {
    has_doi_shape(&record.doi)
        || is_web_url(&record.url)
        || !record.title.is_empty()
        || !record.abstract_text.is_empty()
}

/// Cut `text` to at most `max` characters. Returns true when it was cut.
fn truncate_chars(text: &mut String, max: usize) -> bool {
    let cut_at = text.char_indices().nth(max).map(|(offset, _)| offset);
    match cut_at {
        Some(offset) => {
            text.truncate(offset);
            true
        }
        None => false,
    }
}

/// Project usable records into the minimal schema, trimming oversized cells.
pub fn project_minimal(records: &[UnifiedRecord]) -> Vec<MinimalRecord> {
    let mut trimmed = 0usize;
    let minimal: Vec<MinimalRecord> = records
        .iter()
        .filter(|r| is_usable(r))
        .map(|r| {
            let mut row = MinimalRecord::from(r);
            let cut_title = truncate_chars(&mut row.title, MAX_TITLE_CHARS);
            let cut_abstract = truncate_chars(&mut row.abstract_text, MAX_ABSTRACT_CHARS);
            if cut_title || cut_abstract {
                trimmed += 1;
            }
            row
        })
        .collect();

    if trimmed > 0 {
        warn!(
            rows = trimmed,
            max_title = MAX_TITLE_CHARS,
            max_abstract = MAX_ABSTRACT_CHARS,
            "Trimmed very long cells in the minimal table; the full table keeps them"
        );
    }
    minimal
}

/// Longest title and abstract, in characters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CellLengths {
    pub max_title: usize,
    pub max_abstract: usize,
}

impl CellLengths {
    pub fn of(records: &[UnifiedRecord]) -> Self {
        records.iter().fold(Self::default(), |acc, r| Self {
            max_title: acc.max_title.max(r.title.chars().count()),
            max_abstract: acc.max_abstract.max(r.abstract_text.chars().count()),
        })
    }

    /// True when the minimal table had to trim at least one cell.
    pub fn exceeds_caps(&self) -> bool {
        self.max_title > MAX_TITLE_CHARS || self.max_abstract > MAX_ABSTRACT_CHARS
    }
}

/// Column order of the full table: canonical fields, then extra columns sorted.
pub fn full_columns(records: &[UnifiedRecord]) -> Vec<String> {
    let extras: BTreeSet<&String> = records.iter().flat_map(|r| r.extra.keys()).collect();
    CANONICAL_FIELDS
        .iter()
        .map(|c| c.to_string())
        .chain(
            extras
                .into_iter()
                .filter(|c| !CANONICAL_FIELDS.contains(&c.as_str()))
                .cloned(),
        )
        .collect()
}

fn csv_writer<W: Write>(mut inner: W) -> Result<csv::Writer<W>> {
    inner.write_all(UTF8_BOM)?;
    Ok(csv::WriterBuilder::new()
        .has_headers(false)
        .quote_style(csv::QuoteStyle::NonNumeric)
        .from_writer(inner))
}

/// Write every field of every record, header included even when empty.
pub fn write_full_table<W: Write>(writer: W, records: &[UnifiedRecord]) -> Result<()> {
    let columns = full_columns(records);
    let mut wtr = csv_writer(writer)?;
    wtr.write_record(&columns)?;
    for record in records {
        wtr.write_record(columns.iter().map(|c| record.column(c)))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write the minimal view.
pub fn write_minimal_table<W: Write>(writer: W, records: &[MinimalRecord]) -> Result<()> {
    let mut wtr = csv_writer(writer)?;
    wtr.write_record(MINIMAL_COLUMNS)?;
    for record in records {
        wtr.write_record([
            record.title.clone(),
            record.abstract_text.clone(),
            record.authors.clone(),
            record.year.map(|y| y.to_string()).unwrap_or_default(),
            record.doi.clone(),
            record.url.clone(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write the three run artifacts into `folder`.
pub fn write_outputs(
    folder: &Path,
    full: &[UnifiedRecord],
    minimal: &[MinimalRecord],
    funnel: &FunnelReport,
) -> Result<()> {
    std::fs::create_dir_all(folder)?;

    let full_path = folder.join(FULL_TABLE_FILE);
    write_full_table(std::fs::File::create(&full_path)?, full)?;
    info!(path = %full_path.display(), rows = full.len(), "Saved full table");

    let minimal_path = folder.join(MINIMAL_TABLE_FILE);
    write_minimal_table(std::fs::File::create(&minimal_path)?, minimal)?;
    info!(path = %minimal_path.display(), rows = minimal.len(), "Saved minimal table");

    let funnel_path = folder.join(FUNNEL_FILE);
    std::fs::write(&funnel_path, serde_json::to_string_pretty(funnel)?)?;
    info!(path = %funnel_path.display(), "Saved funnel");

    Ok(())
}
