//! Source record collector.
//!
//! Runs every (query, fetcher) pair on a bounded pool of spawned tasks. A
//! fetcher that errors or panics contributes zero records for that query and
//! is noted in the [`CollectionReport`]; its siblings are unaffected.

use crate::config::{CollectorConfig, HarvestConfig};
use crate::error::{HarvestError, Result};
use crate::record::RawRecord;
use crate::sources::{build_fetchers, SourceFetcher};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of one fetcher call for one query.
#[derive(Debug, Clone, Serialize)]
pub struct FetchOutcome {
    pub source: String,
    pub query: String,
    pub records: usize,
    /// Set when the call failed and yielded nothing
    pub error: Option<String>,
}

/// Per (source, query) yields for the run summary.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectionReport {
    pub outcomes: Vec<FetchOutcome>,
}

impl CollectionReport {
    pub fn failures(&self) -> impl Iterator<Item = &FetchOutcome> {
        self.outcomes.iter().filter(|o| o.error.is_some())
    }

    /// Records yielded per source, summed over queries. Sources that failed
    /// everywhere still appear, with zero.
    pub fn yields_by_source(&self) -> BTreeMap<String, usize> {
        let mut yields = BTreeMap::new();
        for outcome in &self.outcomes {
            *yields.entry(outcome.source.clone()).or_default() += outcome.records;
        }
        yields
    }
}

struct JobResult {
    query_index: usize,
    fetcher_index: usize,
    outcome: FetchOutcome,
    records: Vec<RawRecord>,
}

pub struct Collector {
    fetchers: Vec<Arc<dyn SourceFetcher>>,
    max_workers: usize,
    per_source_limit: usize,
}

impl Collector {
    pub fn new(fetchers: Vec<Arc<dyn SourceFetcher>>, config: &CollectorConfig) -> Self {
        Self {
            fetchers,
            max_workers: config.max_workers.max(1),
            per_source_limit: config.per_source_limit,
        }
    }

    /// Build the enabled fetchers from `config`, each given only its own settings.
    pub fn from_config(config: &HarvestConfig) -> Result<Self> {
        Ok(Self::new(build_fetchers(config)?, &config.collector))
    }

    pub fn source_names(&self) -> Vec<String> {
        self.fetchers.iter().map(|f| f.name().to_string()).collect()
    }

    /// Fetch every query from every source.
    ///
    /// Records come back ordered by query, then by fetcher registration order,
    /// then in the order each fetcher returned them, however the tasks finished.
    pub async fn collect(&self, queries: &[String]) -> (Vec<RawRecord>, CollectionReport) {
        let jobs: Vec<(usize, usize)> = (0..queries.len())
            .flat_map(|q| (0..self.fetchers.len()).map(move |f| (q, f)))
            .collect();

        info!(
            queries = queries.len(),
            sources = self.fetchers.len(),
            workers = self.max_workers,
            "Starting collection"
        );

        let mut results: Vec<JobResult> = stream::iter(jobs)
            .map(|(query_index, fetcher_index)| {
                let fetcher = Arc::clone(&self.fetchers[fetcher_index]);
                let query = queries[query_index].clone();
                let limit = self.per_source_limit;
                async move {
                    let (outcome, records) = run_job(fetcher, query, limit).await;
                    JobResult {
                        query_index,
                        fetcher_index,
                        outcome,
                        records,
                    }
                }
            })
            .buffer_unordered(self.max_workers)
            .collect()
            .await;

        results.sort_by_key(|r| (r.query_index, r.fetcher_index));

        let mut report = CollectionReport::default();
        let mut records = Vec::new();
        for result in results {
            report.outcomes.push(result.outcome);
            records.extend(result.records);
        }

        info!(
            total = records.len(),
            failed = report.failures().count(),
            "Collection complete"
        );
        (records, report)
    }
}

/// Run one fetcher call on its own task so a panic stays contained.
async fn run_job(
    fetcher: Arc<dyn SourceFetcher>,
    query: String,
    limit: usize,
) -> (FetchOutcome, Vec<RawRecord>) {
    let source = fetcher.name().to_string();

    let task_query = query.clone();
    let handle = tokio::spawn(async move { fetcher.fetch(&task_query, limit).await });

    let result = match handle.await {
        Ok(result) => result,
        Err(join_error) => Err(HarvestError::Source {
            source_name: source.clone(),
            message: format!("fetch task aborted: {}", join_error),
        }),
    };

    match result {
        Ok(mut records) => {
            for record in &mut records {
                if record.get_str("source").is_none_or(|s| s.trim().is_empty()) {
                    record.insert("source", source.as_str());
                }
            }
            let outcome = FetchOutcome {
                source,
                query,
                records: records.len(),
                error: None,
            };
            (outcome, records)
        }
        Err(e) => {
            warn!(
                source = %source,
                query = %query,
                error = %e,
                "Source failed, contributing zero records"
            );
            let outcome = FetchOutcome {
                source,
                query,
                records: 0,
                error: Some(e.to_string()),
            };
            (outcome, Vec::new())
        }
    }
}
