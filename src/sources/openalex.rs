//! OpenAlex works search.
//!
//! API notes:
//! - `mailto` puts requests in the polite pool (10 req/s vs 1 req/s)
//! - `per-page` tops out at 200, so larger limits walk several pages
//! - abstracts come as an inverted index and are rebuilt here

use super::http::{build_client, send_with_retry, HttpSettings};
use super::SourceFetcher;
use crate::config::PoliteSourceConfig;
use crate::error::{HarvestError, Result};
use crate::record::RawRecord;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

pub const SOURCE_NAME: &str = "openalex";

const OPENALEX_API_BASE: &str = "https://api.openalex.org";

/// Maximum results per page (OpenAlex limit)
const MAX_PER_PAGE: usize = 200;

const SELECT_FIELDS: &str = "id,display_name,title,publication_year,doi,cited_by_count,\
abstract_inverted_index,authorships,primary_location,language,type";

pub struct OpenAlexFetcher {
    client: reqwest::Client,
    http: HttpSettings,
    base_url: String,
    mailto: Option<String>,
}

impl OpenAlexFetcher {
    pub fn new(config: &PoliteSourceConfig, http: &HttpSettings) -> Result<Self> {
        let user_agent = match &config.mailto {
            Some(mail) => format!("litharvest/0.1 (mailto:{})", mail),
            None => "litharvest/0.1".to_string(),
        };
        Ok(Self {
            client: build_client(http, &user_agent, None)?,
            http: http.clone(),
            base_url: OPENALEX_API_BASE.to_string(),
            mailto: config.mailto.clone(),
        })
    }

    /// Point the fetcher at another host (mirrors, tests).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn fetch_page(&self, query: &str, page: usize, per_page: usize) -> Result<Vec<RawRecord>> {
        let url = format!("{}/works", self.base_url);
        let per_page = per_page.to_string();
        let page = page.to_string();

        let response = send_with_retry(SOURCE_NAME, &self.http, || {
            let mut request = self.client.get(&url).query(&[
                ("search", query),
                ("per-page", per_page.as_str()),
                ("page", page.as_str()),
                ("select", SELECT_FIELDS),
            ]);
            if let Some(mail) = &self.mailto {
                request = request.query(&[("mailto", mail.as_str())]);
            }
            request
        })
        .await?;

        let body = response.text().await?;
        parse_response(&body)
    }
}

#[async_trait]
impl SourceFetcher for OpenAlexFetcher {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn fetch(&self, query: &str, limit: usize) -> Result<Vec<RawRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let per_page = limit.clamp(1, MAX_PER_PAGE);
        let mut records = Vec::new();
        let mut page = 1;

        while records.len() < limit {
            debug!(query = query, page = page, "Fetching OpenAlex page");
            let batch = self.fetch_page(query, page, per_page).await?;
            let exhausted = batch.len() < per_page;
            records.extend(batch);
            if exhausted {
                break;
            }
            page += 1;
        }

        records.truncate(limit);
        info!(query = query, count = records.len(), "OpenAlex query complete");
        Ok(records)
    }
}

#[derive(Debug, Deserialize)]
struct OpenAlexResponse {
    #[serde(default)]
    results: Vec<OpenAlexWork>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexWork {
    id: Option<String>,
    title: Option<String>,
    display_name: Option<String>,
    publication_year: Option<i32>,
    doi: Option<String>,
    cited_by_count: Option<i64>,
    abstract_inverted_index: Option<serde_json::Value>,
    authorships: Option<Vec<OpenAlexAuthorship>>,
    primary_location: Option<OpenAlexLocation>,
    language: Option<String>,
    #[serde(rename = "type")]
    work_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexAuthorship {
    author: Option<OpenAlexAuthor>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexAuthor {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexLocation {
    source: Option<OpenAlexSource>,
    landing_page_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexSource {
    display_name: Option<String>,
    host_organization_name: Option<String>,
}

fn parse_response(json_str: &str) -> Result<Vec<RawRecord>> {
    let response: OpenAlexResponse = serde_json::from_str(json_str)
        .map_err(|e| HarvestError::Parse(format!("Failed to parse OpenAlex response: {}", e)))?;

    Ok(response.results.into_iter().map(work_to_record).collect())
}

fn work_to_record(work: OpenAlexWork) -> RawRecord {
    let authors = work.authorships.map(|authorships| {
        authorships
            .into_iter()
            .filter_map(|a| a.author.and_then(|a| a.display_name))
            .collect::<Vec<_>>()
            .join(", ")
    });

    let (journal, publisher, landing_page) = match work.primary_location {
        Some(location) => {
            let (journal, publisher) = location
                .source
                .map(|s| (s.display_name, s.host_organization_name))
                .unwrap_or((None, None));
            (journal, publisher, location.landing_page_url)
        }
        None => (None, None, None),
    };

    let url = landing_page.or_else(|| work.doi.clone());

    RawRecord::new()
        .with("source", SOURCE_NAME)
        .with("title", work.display_name.or(work.title))
        .with("abstract", work.abstract_inverted_index.as_ref().map(reconstruct_abstract))
        .with("authors", authors)
        .with("year", work.publication_year)
        .with("doi", work.doi)
        .with("url", url)
        .with("journal", journal)
        .with("publisher", publisher)
        .with("openalex_id", work.id)
        .with("cited_by_count", work.cited_by_count)
        .with("language", work.language)
        .with("work_type", work.work_type)
}

/// Rebuild plaintext from OpenAlex's `{word: [positions]}` abstract encoding.
fn reconstruct_abstract(inverted_index: &serde_json::Value) -> String {
    let Some(obj) = inverted_index.as_object() else {
        return String::new();
    };

    let mut words: Vec<(i64, &str)> = obj
        .iter()
        .filter_map(|(word, positions)| Some((word, positions.as_array()?)))
        .flat_map(|(word, positions)| {
            positions
                .iter()
                .filter_map(|p| p.as_i64())
                .map(move |p| (p, word.as_str()))
        })
        .collect();

    words.sort_by_key(|(pos, _)| *pos);
    words.iter().map(|(_, w)| *w).collect::<Vec<_>>().join(" ")
}
