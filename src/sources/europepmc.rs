//! Europe PMC REST search.
//!
//! `resultType=core` is needed for abstracts and publication types; the lite
//! result only carries citation metadata.

use super::http::{build_client, send_with_retry, HttpSettings};
use super::SourceFetcher;
use crate::error::{HarvestError, OptionExt, Result};
use crate::record::RawRecord;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

pub const SOURCE_NAME: &str = "europepmc";

const EUROPE_PMC_SEARCH_URL: &str = "https://www.ebi.ac.uk/europepmc/webservices/rest/search";

/// Europe PMC caps `pageSize` at 1000
const MAX_PAGE_SIZE: usize = 1000;

pub struct EuropePmcFetcher {
    client: reqwest::Client,
    http: HttpSettings,
    base_url: String,
}

impl EuropePmcFetcher {
    pub fn new(http: &HttpSettings) -> Result<Self> {
        Ok(Self {
            client: build_client(http, "litharvest/0.1", None)?,
            http: http.clone(),
            base_url: EUROPE_PMC_SEARCH_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }
}

#[async_trait]
impl SourceFetcher for EuropePmcFetcher {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn fetch(&self, query: &str, limit: usize) -> Result<Vec<RawRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let page_size = limit.clamp(1, MAX_PAGE_SIZE).to_string();

        let response = send_with_retry(SOURCE_NAME, &self.http, || {
            self.client.get(&self.base_url).query(&[
                ("query", query),
                ("format", "json"),
                ("resultType", "core"),
                ("pageSize", page_size.as_str()),
            ])
        })
        .await?;

        let body = response.text().await?;
        let records = parse_response(&body)?;
        info!(query = query, count = records.len(), "Europe PMC query complete");
        Ok(records)
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "resultList")]
    result_list: Option<ResultList>,
}

#[derive(Debug, Deserialize)]
struct ResultList {
    #[serde(default)]
    result: Vec<EpmcResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EpmcResult {
    id: Option<String>,
    source: Option<String>,
    title: Option<String>,
    abstract_text: Option<String>,
    author_string: Option<String>,
    pub_year: Option<String>,
    doi: Option<String>,
    journal_info: Option<JournalInfo>,
    pub_type_list: Option<PubTypeList>,
    cited_by_count: Option<i64>,
    pmid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JournalInfo {
    journal: Option<Journal>,
}

#[derive(Debug, Deserialize)]
struct Journal {
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PubTypeList {
    #[serde(default)]
    pub_type: Vec<String>,
}

fn parse_response(json_str: &str) -> Result<Vec<RawRecord>> {
    let response: SearchResponse = serde_json::from_str(json_str).map_err(|e| {
        HarvestError::Parse(format!("Failed to parse Europe PMC response: {}", e))
    })?;

    let list = response
        .result_list
        .ok_or_parse("Europe PMC response has no resultList")?;

    Ok(list.result.into_iter().map(result_to_record).collect())
}

/// Journal articles count as peer reviewed unless also tagged as preprints.
fn is_refereed(types: &[String]) -> bool {
    let lowered: Vec<String> = types.iter().map(|t| t.to_lowercase()).collect();
    let article = lowered
        .iter()
        .any(|t| t == "journal article" || t == "research-article");
    let preprint = lowered.iter().any(|t| t.contains("preprint"));
    article && !preprint
}

fn result_to_record(result: EpmcResult) -> RawRecord {
    let url = match (&result.source, &result.id) {
        (Some(source), Some(id)) => Some(format!("https://europepmc.org/article/{}/{}", source, id)),
        _ => None,
    };

    let peer_reviewed = result
        .pub_type_list
        .map(|list| is_refereed(&list.pub_type))
        .unwrap_or(false);

    let journal = result
        .journal_info
        .and_then(|info| info.journal)
        .and_then(|j| j.title);

    RawRecord::new()
        .with("source", SOURCE_NAME)
        .with("title", result.title)
        .with("abstract", result.abstract_text)
        .with("authors", result.author_string)
        .with("year", result.pub_year)
        .with("doi", result.doi)
        .with("url", url)
        .with("journal", journal)
        .with("peer_reviewed", peer_reviewed)
        .with("pmid", result.pmid)
        .with("cited_by_count", result.cited_by_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_response() {
        let body = json!({
            "version": "6.9",
            "hitCount": 2,
            "resultList": {
                "result": [{
                    "id": "34567890",
                    "source": "MED",
                    "pmid": "34567890",
                    "doi": "10.1016/j.ssmph.2021.100901",
                    "title": "Youth unemployment and mental health in Europe.",
                    "authorString": "Rossi M, Garcia L.",
                    "pubYear": "2021",
                    "abstractText": "<h4>Background</h4>Rising youth unemployment...",
                    "journalInfo": {"journal": {"title": "SSM - Population Health"}},
                    "pubTypeList": {"pubType": ["research-article", "Journal Article"]},
                    "citedByCount": 4
                }, {
                    "id": "PPR123",
                    "source": "PPR",
                    "title": "A preprint",
                    "pubTypeList": {"pubType": ["Preprint"]}
                }]
            }
        });

        let records = parse_response(&body.to_string()).expect("parse");
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.get_str("source"), Some("europepmc"));
        assert_eq!(first.get_str("authors"), Some("Rossi M, Garcia L."));
        assert_eq!(first.get_str("year"), Some("2021"));
        assert_eq!(first.get_str("journal"), Some("SSM - Population Health"));
        assert_eq!(
            first.get_str("url"),
            Some("https://europepmc.org/article/MED/34567890")
        );
        assert_eq!(first.get("peer_reviewed"), Some(&json!(true)));

        assert_eq!(records[1].get("peer_reviewed"), Some(&json!(false)));
        assert!(!records[1].contains_key("doi"));
    }

    #[test]
    fn test_missing_result_list() {
        let err = parse_response(r#"{"hitCount": 0}"#).expect_err("should fail");
        assert!(matches!(err, HarvestError::Parse(_)));
    }

    #[tokio::test]
    async fn test_zero_limit_returns_nothing() {
        let fetcher = EuropePmcFetcher::new(&HttpSettings::default())
            .expect("fetcher")
            .with_base_url("http://127.0.0.1:9/search");
        assert!(fetcher.fetch("neet", 0).await.expect("fetch").is_empty());
    }

    #[test]
    fn test_is_refereed() {
        assert!(is_refereed(&["Journal Article".to_string()]));
        assert!(!is_refereed(&[
            "journal article".to_string(),
            "Preprint".to_string()
        ]));
        assert!(!is_refereed(&["Review".to_string()]));
    }
}
