//! Google Scholar listing scraper.
//!
//! Scholar has no API; result pages are fetched as HTML and parsed with CSS
//! selectors. Pages hold ten results each, so a limit of `n` walks
//! `ceil(n / 10)` pages with a randomized pause between them.

use super::http::{build_client, send_with_retry, HttpSettings};
use super::SourceFetcher;
use crate::config::GoogleScholarConfig;
use crate::error::{HarvestError, Result};
use crate::record::RawRecord;
use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

pub const SOURCE_NAME: &str = "gscholar";

/// Default Google Scholar URL
pub const DEFAULT_SCHOLAR_URL: &str = "https://scholar.google.com";

/// User agent string for requests
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

const RESULTS_PER_PAGE: usize = 10;

/// Lower bound of the randomized pause between pages
const PAGE_DELAY_MS: u64 = 500;

/// Source data type filter: articles only, no patents or case law
const AS_SDT: &str = "0,5";

pub struct GoogleScholarFetcher {
    client: reqwest::Client,
    http: HttpSettings,
    base_url: String,
}

impl GoogleScholarFetcher {
    pub fn new(config: &GoogleScholarConfig, http: &HttpSettings) -> Result<Self> {
        let base_url = config
            .base_url
            .as_deref()
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_SCHOLAR_URL.to_string());

        Ok(Self {
            client: build_client(http, USER_AGENT, config.proxy.as_deref())?,
            http: http.clone(),
            base_url,
        })
    }

    async fn fetch_page(&self, url: &Url) -> Result<String> {
        let response = send_with_retry(SOURCE_NAME, &self.http, || {
            self.client
                .get(url.as_str())
                .header(
                    "Accept",
                    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
                )
                .header("Accept-Language", "en-US,en;q=0.9")
                .header("Cache-Control", "no-cache")
                .header("Sec-Fetch-Dest", "document")
                .header("Sec-Fetch-Mode", "navigate")
                .header("Upgrade-Insecure-Requests", "1")
        })
        .await?;

        Ok(response.text().await?)
    }

    async fn pause(&self) {
        let delay = PAGE_DELAY_MS + rand::random::<u64>() % (PAGE_DELAY_MS * 3);
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
}

#[async_trait]
impl SourceFetcher for GoogleScholarFetcher {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn fetch(&self, query: &str, limit: usize) -> Result<Vec<RawRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let pages = limit.div_ceil(RESULTS_PER_PAGE);
        let mut records = Vec::new();

        for page in 0..pages {
            if page > 0 {
                self.pause().await;
            }

            let url = build_search_url(&self.base_url, query, page * RESULTS_PER_PAGE)?;
            debug!(page = page + 1, url = %url, "Fetching Scholar page");

            let html = match self.fetch_page(&url).await {
                Ok(html) => html,
                // Keep what earlier pages produced.
                Err(e) if page > 0 => {
                    warn!(page = page + 1, error = %e, "Scholar page failed, stopping early");
                    break;
                }
                Err(e) => return Err(e),
            };

            if is_blocked(&html) {
                return Err(HarvestError::Source {
                    source_name: SOURCE_NAME.to_string(),
                    message: "CAPTCHA detected".to_string(),
                });
            }

            let batch = parse_result_items(&html, &url)?;
            let exhausted = batch.len() < RESULTS_PER_PAGE;
            records.extend(batch);
            if exhausted {
                break;
            }
        }

        records.truncate(limit);
        info!(query = query, count = records.len(), "Google Scholar query complete");
        Ok(records)
    }
}

fn is_blocked(html: &str) -> bool {
    html.contains("Solving the above CAPTCHA") || html.contains("unusual traffic")
}

/// Build Google Scholar search URL
fn build_search_url(base_url: &str, query: &str, start: usize) -> Result<Url> {
    let mut url = Url::parse(&format!("{}/scholar", base_url))
        .map_err(|e| HarvestError::Config(format!("Invalid Scholar base URL: {}", e)))?;

    url.query_pairs_mut()
        .append_pair("q", query)
        .append_pair("hl", "en") // English labels keep "Cited by" parseable
        .append_pair("start", &start.to_string())
        .append_pair("as_sdt", AS_SDT);

    Ok(url)
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| HarvestError::Parse(e.to_string()))
}

/// Parse one Scholar result page into raw records. Relative links are resolved
/// against `page_url`.
fn parse_result_items(html: &str, page_url: &Url) -> Result<Vec<RawRecord>> {
    let document = Html::parse_document(html);

    let item_selector = selector("div.gs_r.gs_or.gs_scl")?;
    let title_selector = selector("h3.gs_rt")?;
    let link_selector = selector("h3.gs_rt a")?;
    let meta_selector = selector("div.gs_a")?;
    let snippet_selector = selector("div.gs_rs")?;
    let cite_selector = selector("div.gs_fl a")?;

    let year_regex = Regex::new(r"\b(1[5-9]|20)\d{2}\b").map_err(|e| HarvestError::Parse(e.to_string()))?;
    let cite_regex = Regex::new(r"Cited by\s*(\d+)").map_err(|e| HarvestError::Parse(e.to_string()))?;
    // Scholar prefixes some titles with a format marker like "[PDF]" or "[CITATION]"
    let marker_regex = Regex::new(r"^\s*(\[[A-Z]+\]\s*)+").map_err(|e| HarvestError::Parse(e.to_string()))?;

    let mut records = Vec::new();

    for item in document.select(&item_selector) {
        let (title, href) = match item.select(&link_selector).next() {
            Some(link) => (
                link.text().collect::<String>(),
                link.value().attr("href").map(str::to_string),
            ),
            None => match item.select(&title_selector).next() {
                Some(title) => (title.text().collect::<String>(), None),
                None => continue,
            },
        };
        let title = marker_regex.replace(title.trim(), "").trim().to_string();
        if title.is_empty() {
            continue;
        }

        let url = href.and_then(|h| page_url.join(&h).ok()).map(String::from);

        let mut authors = None;
        let mut venue = None;
        let mut year = None;
        if let Some(meta) = item.select(&meta_selector).next() {
            // "A Author, B Author - Venue, 2020 - publisher.com"
            let meta_text = meta.text().collect::<String>().replace('\u{a0}', " ");
            let mut parts = meta_text.split(" - ");
            authors = parts.next().map(|a| a.trim().trim_end_matches('…').trim().to_string());
            if let Some(venue_year) = parts.next() {
                match year_regex.find(venue_year) {
                    Some(m) => {
                        year = Some(m.as_str().to_string());
                        venue = Some(venue_year[..m.start()].trim().trim_end_matches(',').to_string());
                    }
                    None => venue = Some(venue_year.trim().to_string()),
                }
            }
        }

        let snippet = item
            .select(&snippet_selector)
            .next()
            .map(|s| s.text().collect::<String>().trim().to_string());

        let citations = item
            .select(&cite_selector)
            .filter(|link| link.value().attr("href").is_some_and(|h| h.contains("cites=")))
            .find_map(|link| {
                let text = link.text().collect::<String>();
                cite_regex
                    .captures(&text)
                    .and_then(|caps| caps.get(1))
                    .and_then(|m| m.as_str().parse::<i64>().ok())
            });

        records.push(
            RawRecord::new()
                .with("source", SOURCE_NAME)
                .with("title", title)
                .with("abstract", snippet.filter(|s| !s.is_empty()))
                .with("authors", authors.filter(|a| !a.is_empty()))
                .with("year", year)
                .with("url", url)
                .with("journal", venue.filter(|v| !v.is_empty()))
                .with("citations", citations),
        );
    }

    Ok(records)
}
