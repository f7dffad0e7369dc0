//! End-to-end orchestration: collect, aggregate, dedup, filter, project.

use crate::aggregate::aggregate;
use crate::collector::{CollectionReport, Collector};
use crate::config::{FilterConfig, HarvestConfig};
use crate::dedup::Deduplicator;
use crate::error::Result;
use crate::export::{project_minimal, CellLengths, MAX_ABSTRACT_CHARS, MAX_TITLE_CHARS};
use crate::funnel::{Checkpoint, FunnelCounters};
use crate::record::{MinimalRecord, RawRecord, UnifiedRecord};
use std::fmt::Write as _;
use tracing::info;

/// Everything a run produces besides the files on disk.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Deduplicated (and optionally region-filtered) records, full schema
    pub full: Vec<UnifiedRecord>,
    /// Usable records in the downstream schema
    pub minimal: Vec<MinimalRecord>,
    pub funnel: FunnelCounters,
}

/// The synchronous part of a run, from raw records to projected views.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    deduplicator: Deduplicator,
    region_filter: bool,
}

impl Pipeline {
    pub fn new(filters: &FilterConfig) -> Self {
        Self {
            deduplicator: Deduplicator::default(),
            region_filter: filters.region_filter,
        }
    }

    /// Process one run's raw records. `raw` must already be in its final
    /// deterministic order since every dedup tie-break is first-seen wins.
    pub fn process(&self, raw: Vec<RawRecord>) -> Result<PipelineOutput> {
        let mut funnel = FunnelCounters::new();
        funnel.record(Checkpoint::RawCollected, raw.len())?;

        let records = aggregate(raw, &mut funnel)?;
        let mut records = self.deduplicator.run(records, &mut funnel)?;

        if self.region_filter {
            let before = records.len();
            records.retain(|r| r.mentions_europe);
            info!(
                kept = records.len(),
                dropped = before - records.len(),
                "Region filter"
            );
            funnel.record(Checkpoint::AfterRegionFilter, records.len())?;
        }

        let minimal = project_minimal(&records);
        funnel.record(Checkpoint::FinalUsable, minimal.len())?;

        Ok(PipelineOutput {
            full: records,
            minimal,
            funnel,
        })
    }
}

/// A complete harvest: pipeline output plus per-source collection outcomes.
#[derive(Debug, Clone)]
pub struct HarvestRun {
    pub output: PipelineOutput,
    pub collection: CollectionReport,
}

impl HarvestRun {
    /// Human-readable run summary. Produced even when every source came back empty.
    pub fn summary(&self) -> String {
        let report = self.output.funnel.report();
        let mut out = String::new();

        let _ = writeln!(out, "Funnel:");
        for (checkpoint, count) in self.output.funnel.iter() {
            let _ = writeln!(out, "  {:<24} {}", checkpoint.as_str(), count);
        }

        let _ = writeln!(out, "Records per source:");
        for (source, count) in self.collection.yields_by_source() {
            let _ = writeln!(out, "  {:<24} {}", source, count);
        }

        let _ = writeln!(out, "Duplicates removed:");
        let dup = &report.duplicates;
        for (pass, removed) in [
            ("doi", dup.removed_by_doi),
            ("title", dup.removed_by_title),
            ("fuzzy title", dup.removed_by_fuzzy),
        ] {
            let _ = writeln!(out, "  {:<24} {}", pass, removed.unwrap_or(0));
        }

        let lengths = CellLengths::of(&self.output.full);
        let _ = writeln!(
            out,
            "Max title length: {}  |  Max abstract length: {}",
            lengths.max_title, lengths.max_abstract
        );
        if lengths.exceeds_caps() {
            let _ = writeln!(
                out,
                "  minimal table trimmed to {} title / {} abstract characters",
                MAX_TITLE_CHARS, MAX_ABSTRACT_CHARS
            );
        }

        let failures: Vec<_> = self.collection.failures().collect();
        if !failures.is_empty() {
            let _ = writeln!(out, "Failed sources:");
            for failure in failures {
                let _ = writeln!(
                    out,
                    "  {} [{}]: {}",
                    failure.source,
                    failure.query,
                    failure.error.as_deref().unwrap_or("unknown error")
                );
            }
        }

        out
    }
}

/// Collect every query from every enabled source and run the pipeline.
pub async fn run(config: &HarvestConfig, queries: &[String]) -> Result<HarvestRun> {
    let collector = Collector::from_config(config)?;
    info!(sources = ?collector.source_names(), "Sources enabled");

    let (raw, collection) = collector.collect(queries).await;
    let output = Pipeline::new(&config.filters).process(raw)?;

    Ok(HarvestRun { output, collection })
}
