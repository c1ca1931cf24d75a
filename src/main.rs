//! # News Pulse
//!
//! A sentiment analysis pipeline for news articles. Given a URL (or raw
//! text), it fetches the page, extracts the readable prose, asks an external
//! inference API for a summary and a sentiment classification, and persists
//! the result for later retrieval.
//!
//! ## Usage
//!
//! ```sh
//! news_pulse analyze https://example.com/story
//! news_pulse analyze --text "This product exceeded all my expectations!"
//! news_pulse history --limit 10
//! news_pulse stats
//! ```
//!
//! ## Architecture
//!
//! The application follows a pipeline architecture:
//! 1. **Fetching**: Retrieve raw HTML through an ordered list of fallback
//!    network configurations
//! 2. **Extraction**: Derive a heading and clean body text via structural
//!    heuristics
//! 3. **Analysis**: Summarize and classify the content through an external
//!    inference API (parallel across URLs, 4 at a time)
//! 4. **Persistence**: Store the resulting records in a bounded local store

use clap::Parser;
use futures::stream::{self, StreamExt};
use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod api;
mod cli;
mod error;
mod extract;
mod fetch;
mod models;
mod pipeline;
mod store;
mod utils;

use api::{Backoff, InferenceClient};
use cli::{Cli, Command};
use fetch::Fetcher;
use models::AnalysisRecord;
use pipeline::Pipeline;
use store::{JsonStore, RecordStore};
use utils::ensure_writable_dir;

/// How many URL analyses may run concurrently.
const PARALLEL_ANALYSES: usize = 4;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    let start_time = std::time::Instant::now();
    info!("news_pulse starting up");

    let args = Cli::parse();
    debug!(?args.data_dir, ?args.endpoint, "Parsed CLI arguments");

    // Early check: ensure the data dir is writable
    if let Err(e) = ensure_writable_dir(&args.data_dir).await {
        error!(
            path = %args.data_dir,
            error = %e,
            "Data directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let store = Arc::new(JsonStore::open(Path::new(&args.data_dir)).await?);

    match args.command {
        Command::Analyze { urls, text } => {
            let client = InferenceClient::new(
                args.endpoint,
                args.api_key,
                args.summarization_model,
                args.sentiment_model,
            )?;
            let analyzer = Backoff::new(client, 5, Duration::from_secs(1));
            let pipeline = Pipeline::new(Fetcher::default(), analyzer, Arc::clone(&store));

            if let Some(text) = text {
                let record = pipeline.analyze_text(&text).await.map_err(|e| {
                    error!(error = %e, "Text analysis failed");
                    e
                })?;
                print_json(&record)?;
            } else if urls.is_empty() {
                return Err("provide at least one URL or --text".into());
            } else {
                let total = urls.len();
                let pipeline = &pipeline;

                // Process URLs concurrently, bounded
                let results: Vec<(String, Result<AnalysisRecord, error::PipelineError>)> =
                    stream::iter(urls)
                        .map(|url| async move {
                            let result = pipeline.analyze_url(&url).await;
                            (url, result)
                        })
                        .buffer_unordered(PARALLEL_ANALYSES)
                        .collect()
                        .await;

                let mut records = Vec::new();
                let mut failed = 0usize;
                for (url, result) in results {
                    match result {
                        Ok(record) => records.push(record),
                        Err(e) => {
                            failed += 1;
                            error!(%url, error = %e, "Analysis failed");
                        }
                    }
                }

                info!(
                    total,
                    successful = records.len(),
                    failed,
                    "Completed analyses"
                );
                print_json(&records)?;

                if records.is_empty() && failed > 0 {
                    return Err("all analyses failed".into());
                }
            }
        }
        Command::Show { url } => match store.find_by_url(&url).await? {
            Some(record) => print_json(&record)?,
            None => {
                return Err(format!("no stored analysis for {url}").into());
            }
        },
        Command::History { limit } => {
            let records = store.recent(limit).await?;
            info!(count = records.len(), "Retrieved analysis history");
            print_json(&records)?;
        }
        Command::Stats => {
            let stats = store.stats().await?;
            print_json(&stats)?;
        }
        Command::Clear => {
            let cleared = store.clear_all().await?;
            info!(cleared, "Cleared stored records");
            print_json(&serde_json::json!({ "cleared": cleared }))?;
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn Error + Send + Sync>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
