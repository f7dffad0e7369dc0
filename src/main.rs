//! litharvest - multi-source literature harvesting pipeline
//!
//! Queries several bibliographic sources, unifies and deduplicates the results,
//! and writes a full table, a minimal screening table and a funnel report.
//!
//! ## Usage
//!
//! ### CLI Mode
//! ```bash
//! litharvest harvest "youth NEET" "early school leaving" --limit 50 --region-filter
//! ```
//!
//! ### HTTP Server Mode
//! ```bash
//! litharvest serve --port 3000
//! ```

use anyhow::{Context, Result};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::Local;
use clap::{Parser, Subcommand};
use litharvest::collector::FetchOutcome;
use litharvest::config::HarvestConfig;
use litharvest::export::write_outputs;
use litharvest::funnel::FunnelReport;
use litharvest::pipeline;
use litharvest::record::MinimalRecord;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, EnvFilter};

/// Longest query fragment used in an output folder name
const MAX_FOLDER_QUERY_LEN: usize = 60;

// ============================================================================
// CLI Definition
// ============================================================================

/// Multi-source literature harvesting pipeline
#[derive(Parser)]
#[command(name = "litharvest")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest, deduplicate and export records for one or more queries
    Harvest {
        /// Search queries
        #[arg(required = true)]
        queries: Vec<String>,

        /// Result-count hint per source and query
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output directory
        #[arg(short, long, default_value = "./output")]
        output: PathBuf,

        /// Keep only records mentioning a European country or region
        #[arg(long)]
        region_filter: bool,

        /// Comma-separated sources to query (default: every enabled source)
        #[arg(long, value_delimiter = ',')]
        sources: Vec<String>,

        /// Semantic Scholar API key
        #[arg(long)]
        s2_api_key: Option<String>,

        /// Contact email for the OpenAlex and Crossref polite pools
        #[arg(long)]
        mailto: Option<String>,

        /// Maximum concurrent fetches
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Run as HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    if cli.log_json {
        fmt().json().with_env_filter(filter).init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .init();
    }

    let config = match &cli.config {
        Some(path) => HarvestConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => HarvestConfig::default(),
    };

    match cli.command {
        Commands::Harvest {
            queries,
            limit,
            output,
            region_filter,
            sources,
            s2_api_key,
            mailto,
            workers,
        } => {
            let mut config = config;
            if let Some(limit) = limit {
                config.collector.per_source_limit = limit;
            }
            if let Some(workers) = workers {
                config.collector.max_workers = workers;
            }
            if region_filter {
                config.filters.region_filter = true;
            }
            if !sources.is_empty() {
                config.restrict_sources(&sources).context("Invalid --sources")?;
            }
            if s2_api_key.is_some() {
                config.sources.semantic_scholar.api_key = s2_api_key;
            }
            if let Some(mail) = mailto {
                config.sources.openalex.mailto = Some(mail.clone());
                config.sources.crossref.mailto = Some(mail);
            }
            run_harvest(&config, &queries, &output).await
        }
        Commands::Serve { port, host } => run_server(config, host, port).await,
    }
}

// ============================================================================
// Harvest
// ============================================================================

async fn run_harvest(config: &HarvestConfig, queries: &[String], output_dir: &Path) -> Result<()> {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
    let output_folder = output_dir.join(format!("{}_{}", timestamp, safe_query(queries)));

    let run = pipeline::run(config, queries)
        .await
        .context("Harvest pipeline failed")?;

    write_outputs(
        &output_folder,
        &run.output.full,
        &run.output.minimal,
        &run.output.funnel.report(),
    )
    .with_context(|| format!("Failed to write outputs to {}", output_folder.display()))?;

    println!("{}", run.summary());
    println!("Output folder: {}", output_folder.display());
    Ok(())
}

/// Filesystem-safe folder fragment derived from the queries.
fn safe_query(queries: &[String]) -> String {
    let joined: String = queries
        .join(" ")
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '-' || *c == '_')
        .collect();
    let safe: String = joined
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .take(MAX_FOLDER_QUERY_LEN)
        .collect();
    if safe.is_empty() {
        "harvest".to_string()
    } else {
        safe
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

async fn run_server(config: HarvestConfig, host: String, port: u16) -> Result<()> {
    info!(host = %host, port = port, "Starting HTTP server");

    let app_state = Arc::new(AppState { config });

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/harvest", post(harvest_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .context("Invalid host:port")?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}

struct AppState {
    /// Base configuration; requests may override the limit and region filter
    config: HarvestConfig,
}

/// Health check endpoint
async fn health_handler() -> &'static str {
    "OK"
}

/// Harvest request body
#[derive(Debug, Deserialize)]
struct HarvestRequest {
    queries: Vec<String>,
    limit: Option<usize>,
    region_filter: Option<bool>,
}

/// Harvest response
#[derive(Debug, Serialize)]
struct HarvestResponse {
    status: String,
    count: usize,
    funnel: Option<FunnelReport>,
    failed_sources: Vec<FetchOutcome>,
    records: Vec<MinimalRecord>,
}

impl HarvestResponse {
    fn error(message: String) -> Self {
        Self {
            status: format!("error: {}", message),
            count: 0,
            funnel: None,
            failed_sources: Vec::new(),
            records: Vec::new(),
        }
    }
}

/// Harvest endpoint handler
async fn harvest_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<HarvestRequest>,
) -> Json<HarvestResponse> {
    info!(queries = ?req.queries, limit = ?req.limit, "Harvest request");

    if req.queries.is_empty() {
        return Json(HarvestResponse::error("no queries given".to_string()));
    }

    let mut config = state.config.clone();
    if let Some(limit) = req.limit {
        config.collector.per_source_limit = limit;
    }
    if let Some(region_filter) = req.region_filter {
        config.filters.region_filter = region_filter;
    }

    match pipeline::run(&config, &req.queries).await {
        Ok(run) => Json(HarvestResponse {
            status: "success".to_string(),
            count: run.output.minimal.len(),
            funnel: Some(run.output.funnel.report()),
            failed_sources: run.collection.failures().cloned().collect(),
            records: run.output.minimal,
        }),
        Err(e) => {
            error!(error = %e, "Harvest failed");
            Json(HarvestResponse::error(e.to_string()))
        }
    }
}
