//! # litharvest
//!
//! Multi-source bibliographic harvesting with normalization, three-pass
//! deduplication and PRISMA-style record accounting.
//!
//! ## Modules
//!
//! - [`sources`] - One [`sources::SourceFetcher`] per API or scraped listing
//! - [`collector`] - Bounded concurrent fan-out over queries and sources
//! - [`normalize`] - Pure text, DOI and title canonicalization
//! - [`aggregate`] - Schema unification and the non-empty filter
//! - [`dedup`] - DOI, exact-title and fuzzy-title passes
//! - [`funnel`] - Write-once stage counters
//! - [`export`] - Minimal projection and CSV/JSON artifacts
//! - [`pipeline`] - End-to-end orchestration
//! - [`config`] - Run configuration and fixed vocabularies
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use litharvest::{config::HarvestConfig, pipeline};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let queries = vec!["youth NEET transitions".to_string()];
//!     let run = pipeline::run(&HarvestConfig::default(), &queries).await?;
//!     println!("{}", run.summary());
//!     Ok(())
//! }
//! ```

pub mod aggregate;
pub mod collector;
pub mod config;
pub mod dedup;
pub mod error;
pub mod export;
pub mod funnel;
pub mod normalize;
pub mod pipeline;
pub mod record;
pub mod sources;

pub use error::{HarvestError, Result};
