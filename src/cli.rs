//! Command-line interface definitions for News Pulse.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Secrets and endpoints can be provided via command-line flags or
//! environment variables.

use crate::api::{DEFAULT_ENDPOINT, DEFAULT_SENTIMENT_MODEL, DEFAULT_SUMMARIZATION_MODEL};
use clap::{Parser, Subcommand};

/// Command-line arguments for the News Pulse application.
///
/// # Examples
///
/// ```sh
/// # Analyze an article
/// news_pulse analyze https://example.com/story
///
/// # Analyze raw text instead of a URL
/// news_pulse analyze --text "This product exceeded all my expectations!"
///
/// # Show the ten most recent analyses
/// news_pulse history --limit 10
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Directory where analysis records are stored
    #[arg(short, long, default_value = "./data")]
    pub data_dir: String,

    /// Base URL of the inference API
    #[arg(long, env = "INFERENCE_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// Bearer token for the inference API
    #[arg(long, env = "INFERENCE_API_KEY")]
    pub api_key: Option<String>,

    /// Summarization model identifier
    #[arg(long, default_value = DEFAULT_SUMMARIZATION_MODEL)]
    pub summarization_model: String,

    /// Sentiment model identifier
    #[arg(long, default_value = DEFAULT_SENTIMENT_MODEL)]
    pub sentiment_model: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Analyze one or more article URLs, or raw text
    Analyze {
        /// Article URLs to analyze
        urls: Vec<String>,

        /// Analyze this raw text instead of fetching a URL
        #[arg(short, long, conflicts_with = "urls")]
        text: Option<String>,
    },

    /// Show the stored record for a previously analyzed URL
    Show {
        /// URL the record was created from
        url: String,
    },

    /// Show recently analyzed articles
    History {
        /// Maximum number of records to show
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },

    /// Show aggregate statistics over stored records
    Stats,

    /// Delete all stored records
    Clear,
}
