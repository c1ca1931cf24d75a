//! Data models for analyzed articles.
//!
//! This module defines the core data structures used throughout the application:
//! - [`ExtractedContent`]: Heading and body text derived from a fetched page
//! - [`Sentiment`] / [`SentimentBreakdown`]: Classification output in canonical form
//! - [`AnalysisRecord`]: One persisted analysis result
//! - [`StoreStats`]: Aggregates computed over stored records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Source value recorded for analyses of raw text rather than a URL.
pub const TEXT_INPUT_SOURCE: &str = "text-input";

/// Heading recorded for analyses of raw text rather than a URL.
pub const TEXT_INPUT_HEADING: &str = "Text Analysis";

/// Canonical sentiment classes.
///
/// Classifier backends report a variety of label vocabularies; everything is
/// normalized to these three values via [`Sentiment::from_raw_label`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    /// Normalize a raw classifier label.
    ///
    /// Recognizes the SST-2 vocabulary (`POSITIVE`/`NEGATIVE`) and the generic
    /// index form (`LABEL_0`/`LABEL_1`). Unrecognized labels map to
    /// [`Sentiment::Neutral`].
    pub fn from_raw_label(label: &str) -> Self {
        match label.to_ascii_uppercase().as_str() {
            "POSITIVE" | "LABEL_1" => Self::Positive,
            "NEGATIVE" | "LABEL_0" => Self::Negative,
            _ => Self::Neutral,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Three-way probability-like distribution over sentiment classes.
///
/// Invariant: the three values sum to 1.0 within a 0.01 tolerance. Every
/// constructor in this crate upholds it; [`SentimentBreakdown::is_normalized`]
/// checks it for data read back from storage.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct SentimentBreakdown {
    pub positive: f64,
    pub neutral: f64,
    pub negative: f64,
}

impl SentimentBreakdown {
    /// Derive a synthetic distribution from a single dominant label and score.
    ///
    /// The dominant class keeps the raw score; the residual `1 - score` is
    /// split 60/40 between neutral and the opposite pole. A neutral label has
    /// no meaningful score to spread, so it gets a fixed split.
    pub fn from_label(sentiment: Sentiment, score: f64) -> Self {
        let residual = 1.0 - score;
        match sentiment {
            Sentiment::Positive => Self {
                positive: score,
                neutral: residual * 0.6,
                negative: residual * 0.4,
            },
            Sentiment::Negative => Self {
                negative: score,
                neutral: residual * 0.6,
                positive: residual * 0.4,
            },
            Sentiment::Neutral => Self {
                neutral: 0.6,
                positive: 0.2,
                negative: 0.2,
            },
        }
    }

    pub fn sum(&self) -> f64 {
        self.positive + self.neutral + self.negative
    }

    pub fn is_normalized(&self) -> bool {
        (self.sum() - 1.0).abs() <= 0.01
    }
}

/// Heading and cleaned body text derived from a fetched page.
///
/// Immutable once produced by the extractor. An empty `body` is valid here;
/// the pipeline decides whether that is an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedContent {
    pub heading: String,
    pub body: String,
}

/// One persisted analysis result.
///
/// Created once per successful pipeline run and never mutated afterwards;
/// records are only ever deleted in bulk.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalysisRecord {
    /// Store-assigned identifier; `None` until saved.
    pub id: Option<String>,
    /// The analyzed URL, or [`TEXT_INPUT_SOURCE`] for raw text.
    pub source: String,
    pub heading: String,
    pub summary: String,
    pub sentiment: Sentiment,
    /// Raw classifier score in `[0, 1]`.
    pub score: f64,
    pub confidence: f64,
    pub breakdown: SentimentBreakdown,
    pub timestamp: DateTime<Utc>,
}

/// Aggregates over the stored records.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreStats {
    pub total_analyses: usize,
    pub sentiment_distribution: BTreeMap<String, usize>,
    pub average_score: f64,
    /// Records saved within the last 24 hours.
    pub recent_analyses: usize,
}
