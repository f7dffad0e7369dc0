//! Run configuration.
//!
//! A [`HarvestConfig`] is built once (defaults, optional TOML file, CLI overrides)
//! and handed to the collector and pipeline. Fetchers only ever see their own
//! section of [`SourcesConfig`].

use crate::error::{HarvestError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Similarity (0-100) at or above which two titles are fuzzy duplicates.
pub const FUZZY_TITLE_THRESHOLD: f64 = 95.0;

/// Publisher name fragments treated as peer-reviewed venues.
pub const PEER_REVIEWED_PUBLISHERS: &[&str] = &[
    "Elsevier",
    "Springer",
    "Wiley",
    "SAGE",
    "Taylor & Francis",
    "Oxford University Press",
    "Cambridge University Press",
    "Routledge",
    "Emerald",
    "De Gruyter",
];

/// Country and region names scanned for in `title + abstract`.
///
/// Matching is a plain substring test, so the short entries ("EU", "UK",
/// "EEA") also hit inside longer words. "EU" is what catches "Europe" and
/// "European".
pub const REGION_NAMES: &[&str] = &[
    "Albania",
    "Austria",
    "Belgium",
    "Bosnia",
    "Croatia",
    "Czech Republic",
    "Denmark",
    "EEA",
    "EU",
    "England",
    "Estonia",
    "European Union",
    "Eurozone",
    "Finland",
    "France",
    "Georgia",
    "Germany",
    "Greece",
    "Hungary",
    "Iceland",
    "Ireland",
    "Italy",
    "Kosovo",
    "Latvia",
    "Lithuania",
    "Luxembourg",
    "Moldova",
    "Montenegro",
    "Netherlands",
    "North Macedonia",
    "Northern Ireland",
    "Norway",
    "Poland",
    "Portugal",
    "Scotland",
    "Serbia",
    "Slovakia",
    "Slovenia",
    "Spain",
    "Sweden",
    "Switzerland",
    "Turkey",
    "UK",
    "Ukraine",
    "United Kingdom",
    "Wales",
];

/// Top-level configuration for a harvest run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub collector: CollectorConfig,
    pub sources: SourcesConfig,
    pub filters: FilterConfig,
}

/// Worker pool and HTTP behaviour shared by all fetchers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Maximum fetch jobs in flight
    pub max_workers: usize,
    /// Result-count hint passed to every fetcher
    pub per_source_limit: usize,
    /// Per-request timeout
    pub timeout_secs: u64,
    /// Retries on 429/5xx before a fetcher gives up on a query
    pub max_retries: u32,
    /// Initial backoff, doubled after each retry
    pub backoff_ms: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            per_source_limit: 100,
            timeout_secs: 30,
            max_retries: 3,
            backoff_ms: 500,
        }
    }
}

/// Per-source settings. Each fetcher receives only its own entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub openalex: PoliteSourceConfig,
    pub crossref: PoliteSourceConfig,
    pub semantic_scholar: SemanticScholarConfig,
    pub europe_pmc: ToggleConfig,
    pub google_scholar: GoogleScholarConfig,
}

/// A source with no settings beyond being switched on or off.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToggleConfig {
    pub enabled: bool,
}

impl Default for ToggleConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Sources offering a "polite pool" to callers identifying with an email.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoliteSourceConfig {
    pub enabled: bool,
    pub mailto: Option<String>,
}

impl Default for PoliteSourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mailto: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticScholarConfig {
    pub enabled: bool,
    /// Optional key for the higher rate limit tier
    pub api_key: Option<String>,
}

impl Default for SemanticScholarConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleScholarConfig {
    /// Off by default: the listing pages are rate limited aggressively
    pub enabled: bool,
    /// Mirror site URL
    pub base_url: Option<String>,
    /// Proxy URL (e.g., http://127.0.0.1:7890)
    pub proxy: Option<String>,
}

/// Post-dedup filters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Keep only records mentioning a European country or region
    pub region_filter: bool,
}

impl HarvestConfig {
    /// Load configuration from a TOML file. Missing keys keep their defaults.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| HarvestError::Config(format!("Invalid config file: {}", e)))
    }

    /// Enable only the named sources. Unknown names are rejected.
    pub fn restrict_sources(&mut self, names: &[String]) -> Result<()> {
        for name in names {
            if !crate::sources::SOURCE_NAMES.contains(&name.as_str()) {
                return Err(HarvestError::Config(format!(
                    "Unknown source '{}' (expected one of: {})",
                    name,
                    crate::sources::SOURCE_NAMES.join(", ")
                )));
            }
        }
        let wanted = |n: &str| names.iter().any(|x| x == n);
        self.sources.openalex.enabled = wanted("openalex");
        self.sources.crossref.enabled = wanted("crossref");
        self.sources.semantic_scholar.enabled = wanted("semanticscholar");
        self.sources.europe_pmc.enabled = wanted("europepmc");
        self.sources.google_scholar.enabled = wanted("gscholar");
        Ok(())
    }
}
