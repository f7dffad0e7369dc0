//! Crossref works query.
//!
//! Abstracts arrive as JATS XML fragments; they are passed through untouched
//! and cleaned by the normalizer like any other abstract.

use super::http::{build_client, send_with_retry, HttpSettings};
use super::SourceFetcher;
use crate::config::PoliteSourceConfig;
use crate::error::{HarvestError, Result};
use crate::record::RawRecord;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

pub const SOURCE_NAME: &str = "crossref";

/// Crossref API base URL
const CROSSREF_API_URL: &str = "https://api.crossref.org/works";

/// Crossref caps `rows` at 1000
const MAX_ROWS: usize = 1000;

const SELECT_FIELDS: &str = "DOI,title,author,container-title,publisher,published,abstract,URL,type";

pub struct CrossrefFetcher {
    client: reqwest::Client,
    http: HttpSettings,
    base_url: String,
    mailto: Option<String>,
}

impl CrossrefFetcher {
    pub fn new(config: &PoliteSourceConfig, http: &HttpSettings) -> Result<Self> {
        let user_agent = match &config.mailto {
            Some(mail) => format!("litharvest/0.1 (mailto:{})", mail),
            None => "litharvest/0.1".to_string(),
        };
        Ok(Self {
            client: build_client(http, &user_agent, None)?,
            http: http.clone(),
            base_url: CROSSREF_API_URL.to_string(),
            mailto: config.mailto.clone(),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }
}

#[async_trait]
impl SourceFetcher for CrossrefFetcher {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn fetch(&self, query: &str, limit: usize) -> Result<Vec<RawRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let rows = limit.clamp(1, MAX_ROWS).to_string();

        let response = send_with_retry(SOURCE_NAME, &self.http, || {
            let mut request = self.client.get(&self.base_url).query(&[
                ("query.bibliographic", query),
                ("rows", rows.as_str()),
                ("select", SELECT_FIELDS),
            ]);
            if let Some(mail) = &self.mailto {
                request = request.query(&[("mailto", mail.as_str())]);
            }
            request
        })
        .await?;

        let body = response.text().await?;
        let records = parse_response(&body)?;
        info!(query = query, count = records.len(), "Crossref query complete");
        Ok(records)
    }
}

// === Crossref API Response Types ===

#[derive(Debug, Deserialize)]
struct CrossrefResponse {
    message: CrossrefMessage,
}

#[derive(Debug, Deserialize)]
struct CrossrefMessage {
    #[serde(default)]
    items: Vec<CrossrefItem>,
}

#[derive(Debug, Deserialize)]
struct CrossrefItem {
    #[serde(rename = "DOI")]
    doi: Option<String>,
    #[serde(default)]
    title: Vec<String>,
    #[serde(default)]
    author: Vec<CrossrefAuthor>,
    #[serde(rename = "container-title", default)]
    container_title: Vec<String>,
    publisher: Option<String>,
    published: Option<CrossrefPublished>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    #[serde(rename = "URL")]
    url: Option<String>,
    #[serde(rename = "type")]
    work_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CrossrefAuthor {
    #[serde(default)]
    given: String,
    #[serde(default)]
    family: String,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CrossrefPublished {
    #[serde(rename = "date-parts", default)]
    date_parts: Vec<Vec<Option<i32>>>,
}

fn parse_response(json_str: &str) -> Result<Vec<RawRecord>> {
    let data: CrossrefResponse = serde_json::from_str(json_str)
        .map_err(|e| HarvestError::Parse(format!("Failed to parse Crossref response: {}", e)))?;

    Ok(data.message.items.into_iter().map(item_to_record).collect())
}

fn item_to_record(item: CrossrefItem) -> RawRecord {
    let authors = item
        .author
        .iter()
        .map(|a| match &a.name {
            Some(name) => name.trim().to_string(),
            None => format!("{} {}", a.given, a.family).trim().to_string(),
        })
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ");

    // date-parts is [[year, month, day]] with trailing parts optional
    let year = item
        .published
        .and_then(|p| p.date_parts.into_iter().next())
        .and_then(|parts| parts.into_iter().next().flatten());

    RawRecord::new()
        .with("source", SOURCE_NAME)
        .with("title", item.title.into_iter().next())
        .with("abstract", item.abstract_text)
        .with("authors", Some(authors).filter(|a| !a.is_empty()))
        .with("year", year)
        .with("doi", item.doi)
        .with("url", item.url)
        .with("journal", item.container_title.into_iter().next())
        .with("publisher", item.publisher)
        .with("work_type", item.work_type)
}
