//! PRISMA-style record counts per pipeline stage.
//!
//! Checkpoints are write-once. The counters are for audit only; nothing in the
//! pipeline branches on them.

use crate::error::{HarvestError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::info;

/// Named pipeline stages, declared in the order they are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Checkpoint {
    RawCollected,
    AfterAggregation,
    AfterNonemptyFilter,
    AfterDoiDedup,
    AfterTitleDedup,
    AfterFuzzyDedup,
    AfterRegionFilter,
    FinalUsable,
}

impl Checkpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Checkpoint::RawCollected => "raw_collected",
            Checkpoint::AfterAggregation => "after_aggregation",
            Checkpoint::AfterNonemptyFilter => "after_nonempty_filter",
            Checkpoint::AfterDoiDedup => "after_doi_dedup",
            Checkpoint::AfterTitleDedup => "after_title_dedup",
            Checkpoint::AfterFuzzyDedup => "after_fuzzy_dedup",
            Checkpoint::AfterRegionFilter => "after_region_filter",
            Checkpoint::FinalUsable => "final_usable",
        }
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accumulator filled once per run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunnelCounters {
    checkpoints: BTreeMap<Checkpoint, usize>,
    by_source: Option<BTreeMap<String, usize>>,
}

impl FunnelCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a checkpoint. Writing the same checkpoint twice is an error.
    pub fn record(&mut self, checkpoint: Checkpoint, count: usize) -> Result<()> {
        if self.checkpoints.contains_key(&checkpoint) {
            return Err(HarvestError::DuplicateCheckpoint(checkpoint.to_string()));
        }
        info!(checkpoint = %checkpoint, count = count, "Funnel checkpoint");
        self.checkpoints.insert(checkpoint, count);
        Ok(())
    }

    /// Write the per-source breakdown taken at ingestion. Write-once like a checkpoint.
    pub fn record_sources(&mut self, by_source: BTreeMap<String, usize>) -> Result<()> {
        if self.by_source.is_some() {
            return Err(HarvestError::DuplicateCheckpoint("by_source".to_string()));
        }
        self.by_source = Some(by_source);
        Ok(())
    }

    pub fn get(&self, checkpoint: Checkpoint) -> Option<usize> {
        self.checkpoints.get(&checkpoint).copied()
    }

    /// `None` until the breakdown has been written.
    pub fn by_source(&self) -> Option<&BTreeMap<String, usize>> {
        self.by_source.as_ref()
    }

    /// Checkpoints in stage order.
    pub fn iter(&self) -> impl Iterator<Item = (Checkpoint, usize)> + '_ {
        self.checkpoints.iter().map(|(k, v)| (*k, *v))
    }

    fn removed_between(&self, before: Checkpoint, after: Checkpoint) -> Option<usize> {
        Some(self.get(before)?.saturating_sub(self.get(after)?))
    }

    /// Freeze into the JSON document written next to the exported tables.
    pub fn report(&self) -> FunnelReport {
        FunnelReport {
            generated_at: Utc::now(),
            checkpoints: self.checkpoints.clone(),
            by_source: self.by_source.clone().unwrap_or_default(),
            duplicates: DuplicateDiagnostics {
                removed_by_doi: self
                    .removed_between(Checkpoint::AfterNonemptyFilter, Checkpoint::AfterDoiDedup),
                removed_by_title: self
                    .removed_between(Checkpoint::AfterDoiDedup, Checkpoint::AfterTitleDedup),
                removed_by_fuzzy: self
                    .removed_between(Checkpoint::AfterTitleDedup, Checkpoint::AfterFuzzyDedup),
            },
        }
    }
}

/// Records removed by each dedup pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateDiagnostics {
    pub removed_by_doi: Option<usize>,
    pub removed_by_title: Option<usize>,
    pub removed_by_fuzzy: Option<usize>,
}

/// Serialized form of [`FunnelCounters`]. Checkpoint counts sit at the top
/// level of the document, keyed by checkpoint name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunnelReport {
    pub generated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub checkpoints: BTreeMap<Checkpoint, usize>,
    pub by_source: BTreeMap<String, usize>,
    pub duplicates: DuplicateDiagnostics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_is_write_once() {
        let mut funnel = FunnelCounters::new();
        funnel.record(Checkpoint::RawCollected, 10).expect("first write");
        let err = funnel.record(Checkpoint::RawCollected, 9).expect_err("should fail");
        assert!(matches!(err, HarvestError::DuplicateCheckpoint(name) if name == "raw_collected"));
        assert_eq!(funnel.get(Checkpoint::RawCollected), Some(10));
    }

    #[test]
    fn test_sources_write_once() {
        let mut funnel = FunnelCounters::new();
        let mut sources = BTreeMap::new();
        sources.insert("crossref".to_string(), 3);
        funnel.record_sources(sources.clone()).expect("first write");
        assert!(funnel.record_sources(sources).is_err());
        assert_eq!(funnel.by_source().and_then(|s| s.get("crossref")), Some(&3));
    }

    #[test]
    fn test_empty_sources_still_write_once() {
        let mut funnel = FunnelCounters::new();
        assert!(funnel.by_source().is_none());
        funnel.record_sources(BTreeMap::new()).expect("first write");
        assert_eq!(funnel.by_source().map(|s| s.len()), Some(0));

        let mut late = BTreeMap::new();
        late.insert("openalex".to_string(), 1);
        let err = funnel.record_sources(late).expect_err("should fail");
        assert!(matches!(err, HarvestError::DuplicateCheckpoint(name) if name == "by_source"));
        assert_eq!(funnel.by_source().map(|s| s.len()), Some(0));
    }

    #[test]
    fn test_iter_in_stage_order() {
        let mut funnel = FunnelCounters::new();
        funnel.record(Checkpoint::AfterDoiDedup, 5).expect("write");
        funnel.record(Checkpoint::RawCollected, 8).expect("write");
        funnel.record(Checkpoint::FinalUsable, 4).expect("write");

        let order: Vec<Checkpoint> = funnel.iter().map(|(c, _)| c).collect();
        assert_eq!(
            order,
            vec![Checkpoint::RawCollected, Checkpoint::AfterDoiDedup, Checkpoint::FinalUsable]
        );
    }

    #[test]
    fn test_report_json_shape() {
        let mut funnel = FunnelCounters::new();
        funnel.record(Checkpoint::AfterNonemptyFilter, 10).expect("write");
        funnel.record(Checkpoint::AfterDoiDedup, 8).expect("write");
        funnel.record(Checkpoint::AfterTitleDedup, 7).expect("write");
        funnel.record(Checkpoint::AfterFuzzyDedup, 7).expect("write");

        let report = funnel.report();
        assert_eq!(report.duplicates.removed_by_doi, Some(2));
        assert_eq!(report.duplicates.removed_by_title, Some(1));
        assert_eq!(report.duplicates.removed_by_fuzzy, Some(0));

        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["after_doi_dedup"], 8);
        assert_eq!(json["after_fuzzy_dedup"], 7);
        assert!(json.get("checkpoints").is_none());
        assert!(json["generated_at"].is_string());
        assert_eq!(json["duplicates"]["removed_by_doi"], 2);

        let back: FunnelReport = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back.checkpoints.get(&Checkpoint::AfterTitleDedup), Some(&7));
    }
}
