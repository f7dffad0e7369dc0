//! Semantic Scholar paper search.
//!
//! API Details:
//! - Search endpoint: GET /graph/v1/paper/search
//! - At most 100 results per request
//! - Rate limit: shared pool when unauthenticated, higher with `x-api-key`

use super::http::{build_client, send_with_retry, HttpSettings};
use super::SourceFetcher;
use crate::config::SemanticScholarConfig;
use crate::error::{HarvestError, Result};
use crate::record::RawRecord;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

pub const SOURCE_NAME: &str = "semanticscholar";

/// Semantic Scholar API base URL
const SS_API_BASE: &str = "https://api.semanticscholar.org/graph/v1";

const MAX_LIMIT: usize = 100;

const FIELDS: &str = "title,abstract,authors,year,externalIds,url,venue,journal,publicationTypes";

pub struct SemanticScholarFetcher {
    client: reqwest::Client,
    http: HttpSettings,
    base_url: String,
    api_key: Option<String>,
}

impl SemanticScholarFetcher {
    pub fn new(config: &SemanticScholarConfig, http: &HttpSettings) -> Result<Self> {
        Ok(Self {
            client: build_client(http, "litharvest/0.1", None)?,
            http: http.clone(),
            base_url: SS_API_BASE.to_string(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl SourceFetcher for SemanticScholarFetcher {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn fetch(&self, query: &str, limit: usize) -> Result<Vec<RawRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let url = format!("{}/paper/search", self.base_url);
        let limit = limit.clamp(1, MAX_LIMIT).to_string();

        let response = send_with_retry(SOURCE_NAME, &self.http, || {
            let mut request = self.client.get(&url).query(&[
                ("query", query),
                ("limit", limit.as_str()),
                ("fields", FIELDS),
            ]);
            if let Some(key) = &self.api_key {
                request = request.header("x-api-key", key);
            }
            request
        })
        .await?;

        let body = response.text().await?;
        let records = parse_response(&body)?;
        info!(query = query, count = records.len(), "Semantic Scholar query complete");
        Ok(records)
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<SSPaper>,
}

#[derive(Debug, Deserialize)]
struct SSPaper {
    #[serde(rename = "paperId")]
    paper_id: Option<String>,
    title: Option<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    #[serde(default)]
    authors: Vec<SSAuthor>,
    year: Option<i32>,
    #[serde(rename = "externalIds")]
    external_ids: Option<SSExternalIds>,
    url: Option<String>,
    venue: Option<String>,
    journal: Option<SSJournal>,
    #[serde(rename = "publicationTypes")]
    publication_types: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct SSAuthor {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SSExternalIds {
    #[serde(rename = "DOI")]
    doi: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SSJournal {
    name: Option<String>,
}

fn parse_response(json_str: &str) -> Result<Vec<RawRecord>> {
    let response: SearchResponse = serde_json::from_str(json_str).map_err(|e| {
        HarvestError::Parse(format!("Failed to parse Semantic Scholar response: {}", e))
    })?;

    Ok(response.data.into_iter().map(paper_to_record).collect())
}

fn paper_to_record(paper: SSPaper) -> RawRecord {
    let authors = paper
        .authors
        .into_iter()
        .filter_map(|a| a.name)
        .collect::<Vec<_>>()
        .join(", ");

    let journal = paper
        .journal
        .and_then(|j| j.name)
        .filter(|n| !n.trim().is_empty())
        .or(paper.venue);

    RawRecord::new()
        .with("source", SOURCE_NAME)
        .with("title", paper.title)
        .with("abstract", paper.abstract_text)
        .with("authors", Some(authors).filter(|a| !a.is_empty()))
        .with("year", paper.year)
        .with("doi", paper.external_ids.and_then(|ids| ids.doi))
        .with("url", paper.url)
        .with("journal", journal)
        .with("s2_paper_id", paper.paper_id)
        .with("publication_types", paper.publication_types.map(|t| t.join(", ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_response() {
        let body = json!({
            "total": 2,
            "offset": 0,
            "data": [{
                "paperId": "abc123",
                "title": "Youth NEET transitions",
                "abstract": null,
                "authors": [{"authorId": "1", "name": "M. Rossi"}],
                "year": 2020,
                "externalIds": {"DOI": "10.1177/XYZ", "MAG": "123"},
                "url": "https://www.semanticscholar.org/paper/abc123",
                "venue": "Journal of Youth Studies",
                "journal": {"name": ""},
                "publicationTypes": ["JournalArticle"]
            }, {
                "paperId": "def456",
                "title": "No ids",
                "authors": []
            }]
        });

        let records = parse_response(&body.to_string()).expect("parse");
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.get_str("doi"), Some("10.1177/XYZ"));
        assert_eq!(first.get_str("journal"), Some("Journal of Youth Studies"));
        assert_eq!(first.get_str("authors"), Some("M. Rossi"));
        assert!(!first.contains_key("abstract"));
        assert_eq!(first.get_str("publication_types"), Some("JournalArticle"));

        let second = &records[1];
        assert!(!second.contains_key("doi"));
        assert!(!second.contains_key("authors"));
    }

    #[tokio::test]
    async fn test_api_key_sent_as_header() {
        use axum::{http::HeaderMap, routing::get, Json, Router};

        let app = Router::new().route(
            "/paper/search",
            get(|headers: HeaderMap| async move {
                let title = headers
                    .get("x-api-key")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("no key")
                    .to_string();
                Json(json!({"data": [{"paperId": "p1", "title": title}]}))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let config = SemanticScholarConfig {
            enabled: true,
            api_key: Some("s2-secret".to_string()),
        };
        let fetcher = SemanticScholarFetcher::new(&config, &HttpSettings::default())
            .expect("fetcher")
            .with_base_url(&format!("http://{}", addr));

        let records = fetcher.fetch("neet", 5).await.expect("fetch");
        assert_eq!(records[0].get_str("title"), Some("s2-secret"));
    }

    #[tokio::test]
    async fn test_zero_limit_returns_nothing() {
        let fetcher =
            SemanticScholarFetcher::new(&SemanticScholarConfig::default(), &HttpSettings::default())
                .expect("fetcher")
                .with_base_url("http://127.0.0.1:9");
        assert!(fetcher.fetch("neet", 0).await.expect("fetch").is_empty());
    }

    #[test]
    fn test_missing_data_is_empty() {
        let records = parse_response(r#"{"total": 0, "offset": 0}"#).expect("parse");
        assert!(records.is_empty());
    }
}
