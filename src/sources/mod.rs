//! Source fetchers.
//!
//! Every source implements [`SourceFetcher`]: given a query and a result-count
//! hint it returns best-effort [`RawRecord`]s. Nothing downstream depends on a
//! source's response shape.

pub mod crossref;
pub mod europepmc;
pub mod gscholar;
pub mod http;
pub mod openalex;
pub mod semanticscholar;

use crate::config::HarvestConfig;
use crate::error::Result;
use crate::record::RawRecord;
use async_trait::async_trait;
use self::http::HttpSettings;
use std::sync::Arc;

/// Names accepted by `--sources` and used as the `source` column.
pub const SOURCE_NAMES: &[&str] = &[
    openalex::SOURCE_NAME,
    crossref::SOURCE_NAME,
    semanticscholar::SOURCE_NAME,
    europepmc::SOURCE_NAME,
    gscholar::SOURCE_NAME,
];

/// A single bibliographic source.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Stable identifier written to each record's `source` field.
    fn name(&self) -> &str;

    /// Fetch up to roughly `limit` records for `query`.
    async fn fetch(&self, query: &str, limit: usize) -> Result<Vec<RawRecord>>;
}

/// Build the enabled fetchers, in a fixed order, each with only its own settings.
pub fn build_fetchers(config: &HarvestConfig) -> Result<Vec<Arc<dyn SourceFetcher>>> {
    let http = HttpSettings::from(&config.collector);
    let sources = &config.sources;
    let mut fetchers: Vec<Arc<dyn SourceFetcher>> = Vec::new();

    if sources.openalex.enabled {
        fetchers.push(Arc::new(openalex::OpenAlexFetcher::new(&sources.openalex, &http)?));
    }
    if sources.crossref.enabled {
        fetchers.push(Arc::new(crossref::CrossrefFetcher::new(&sources.crossref, &http)?));
    }
    if sources.semantic_scholar.enabled {
        fetchers.push(Arc::new(semanticscholar::SemanticScholarFetcher::new(
            &sources.semantic_scholar,
            &http,
        )?));
    }
    if sources.europe_pmc.enabled {
        fetchers.push(Arc::new(europepmc::EuropePmcFetcher::new(&http)?));
    }
    if sources.google_scholar.enabled {
        fetchers.push(Arc::new(gscholar::GoogleScholarFetcher::new(
            &sources.google_scholar,
            &http,
        )?));
    }

    Ok(fetchers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_fetchers_respects_toggles() {
        let mut config = HarvestConfig::default();
        let names: Vec<String> = build_fetchers(&config)
            .expect("fetchers")
            .iter()
            .map(|f| f.name().to_string())
            .collect();
        assert_eq!(names, vec!["openalex", "crossref", "semanticscholar", "europepmc"]);

        config
            .restrict_sources(&["gscholar".to_string()])
            .expect("known source");
        let names: Vec<String> = build_fetchers(&config)
            .expect("fetchers")
            .iter()
            .map(|f| f.name().to_string())
            .collect();
        assert_eq!(names, vec!["gscholar"]);
    }
}
