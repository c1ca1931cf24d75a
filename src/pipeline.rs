//! The analysis pipeline: validate, fetch, extract, classify, persist.
//!
//! A single pass per input, terminal on the first failure. Collaborators (the
//! model client and the record store) are injected at construction and owned
//! by the process entry point; the pipeline itself holds no global state, so
//! any number of invocations can run concurrently.

use crate::api::Analyze;
use crate::error::{PipelineError, Result};
use crate::extract;
use crate::fetch::{FetchFailure, Fetcher};
use crate::models::{
    AnalysisRecord, ExtractedContent, Sentiment, SentimentBreakdown, TEXT_INPUT_HEADING,
    TEXT_INPUT_SOURCE,
};
use crate::store::RecordStore;
use crate::utils::truncate_chars;
use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Minimum trimmed length for raw text input.
const MIN_TEXT_INPUT_CHARS: usize = 10;

/// Minimum trimmed body length below which extraction counts as failed.
const MIN_BODY_CHARS: usize = 50;

/// Length of the slice handed to the summarizer/classifier.
const ANALYSIS_WINDOW_CHARS: usize = 1000;

/// Summary length bounds passed to the summarizer.
const SUMMARY_MAX_LEN: u32 = 50;
const SUMMARY_MIN_LEN: u32 = 30;

/// Domains known to reject automated clients outright, for error hints.
const BLOCKING_DOMAINS: [&str; 4] = ["reuters.com", "bloomberg.com", "wsj.com", "ft.com"];

/// Sequences fetch, extraction, and model calls into an [`AnalysisRecord`].
pub struct Pipeline<A, S> {
    fetcher: Fetcher,
    analyzer: A,
    store: S,
}

impl<A, S> Pipeline<A, S>
where
    A: Analyze,
    S: RecordStore,
{
    pub fn new(fetcher: Fetcher, analyzer: A, store: S) -> Self {
        Self {
            fetcher,
            analyzer,
            store,
        }
    }

    /// Analyze the article behind a URL.
    #[instrument(level = "info", skip(self))]
    pub async fn analyze_url(&self, url: &str) -> Result<AnalysisRecord> {
        validate_url(url)?;

        let html = self.fetcher.fetch(url).await.map_err(|e| match e {
            FetchFailure::InvalidUrl { url } => {
                PipelineError::Validation(format!("'{url}' is not a valid http(s) URL"))
            }
            FetchFailure::Exhausted { url, .. } => {
                let hint = fetch_hint(&url);
                PipelineError::Fetch { url, hint }
            }
        })?;

        self.analyze_fetched(url, &html).await
    }

    /// Analyze raw text directly, skipping fetch and extraction.
    #[instrument(level = "info", skip_all)]
    pub async fn analyze_text(&self, text: &str) -> Result<AnalysisRecord> {
        let trimmed = text.trim();
        if trimmed.chars().count() < MIN_TEXT_INPUT_CHARS {
            return Err(PipelineError::Validation(format!(
                "text must be at least {MIN_TEXT_INPUT_CHARS} characters long"
            )));
        }

        self.finish(
            TEXT_INPUT_SOURCE.to_string(),
            TEXT_INPUT_HEADING.to_string(),
            trimmed.to_string(),
        )
        .await
    }

    /// Extraction and the content gate, separated from `analyze_url` so the
    /// gate is exercised without a network round trip.
    async fn analyze_fetched(&self, url: &str, html: &str) -> Result<AnalysisRecord> {
        let ExtractedContent { heading, body } = extract::extract(html);

        if body.trim().chars().count() < MIN_BODY_CHARS {
            return Err(PipelineError::Content(
                "No readable text content found in the article. Please try a different URL \
                 with more accessible text content."
                    .to_string(),
            ));
        }

        self.finish(url.to_string(), heading, body).await
    }

    /// Shared tail of both input paths: window, model calls, assembly,
    /// persistence.
    async fn finish(&self, source: String, heading: String, body: String) -> Result<AnalysisRecord> {
        let window = analysis_window(&heading, &body);
        debug!(window_chars = window.chars().count(), "Prepared analysis window");

        let (summary, raw) = tokio::join!(
            self.analyzer
                .summarize(&window, SUMMARY_MAX_LEN, SUMMARY_MIN_LEN),
            self.analyzer.classify(&window),
        );
        let summary = summary
            .map_err(|e| PipelineError::Classification(format!("summarization failed: {e}")))?;
        let raw = raw.map_err(|e| {
            PipelineError::Classification(format!("sentiment classification failed: {e}"))
        })?;

        let sentiment = Sentiment::from_raw_label(&raw.label);
        let breakdown = SentimentBreakdown::from_label(sentiment, raw.score);
        debug_assert!(breakdown.is_normalized());

        let record = AnalysisRecord {
            id: None,
            source,
            heading,
            summary,
            sentiment,
            score: raw.score,
            confidence: raw.score,
            breakdown,
            timestamp: Utc::now(),
        };

        info!(source = %record.source, sentiment = %record.sentiment, score = record.score, "Analysis complete");

        // Persistence failures never fail the pipeline; the record is still
        // returned to the caller.
        match self.store.save(record.clone()).await {
            Ok(saved) => Ok(saved),
            Err(e) => {
                warn!(error = %e, "Failed to persist analysis; returning unsaved record");
                Ok(record)
            }
        }
    }
}

fn validate_url(url: &str) -> Result<()> {
    let well_formed = Url::parse(url)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false);
    if well_formed {
        Ok(())
    } else {
        Err(PipelineError::Validation(format!(
            "'{url}' is not a valid http(s) URL"
        )))
    }
}

/// The slice of body text handed to the models. If the window comes up too
/// short, widen it by prepending the heading.
fn analysis_window(heading: &str, body: &str) -> String {
    let window = truncate_chars(body, ANALYSIS_WINDOW_CHARS);
    if window.trim().chars().count() >= MIN_BODY_CHARS {
        return window;
    }
    truncate_chars(&format!("{heading}. {body}"), ANALYSIS_WINDOW_CHARS)
}

/// User-facing guidance for a URL no configuration could fetch.
fn fetch_hint(url: &str) -> String {
    let host = Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned))
        .unwrap_or_default();

    let known_blocker = BLOCKING_DOMAINS
        .iter()
        .any(|d| host == *d || host.ends_with(&format!(".{d}")));

    if known_blocker {
        format!(
            "{host} is known to block automated requests; try the article on an archive or \
             text-only mirror instead."
        )
    } else {
        "This could be due to the website blocking automated requests or network issues. \
         Please try a different URL."
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, RawClassification};
    use crate::fetch::FetchAttemptConfig;
    use crate::store::StoreError;
    use std::result::Result as StdResult;
    use tokio::sync::Mutex;

    /// Deterministic stand-in for the inference backend.
    struct StubAnalyzer {
        label: &'static str,
        score: f64,
        fail: bool,
    }

    impl StubAnalyzer {
        fn positive() -> Self {
            Self {
                label: "POSITIVE",
                score: 0.95,
                fail: false,
            }
        }
    }

    impl Analyze for StubAnalyzer {
        async fn summarize(
            &self,
            text: &str,
            _max_len: u32,
            _min_len: u32,
        ) -> StdResult<String, ApiError> {
            if self.fail {
                return Err("model unavailable".into());
            }
            Ok(format!("Summary of: {}", truncate_chars(text, 40)))
        }

        async fn classify(&self, _text: &str) -> StdResult<RawClassification, ApiError> {
            if self.fail {
                return Err("model unavailable".into());
            }
            Ok(RawClassification {
                label: self.label.to_string(),
                score: self.score,
            })
        }
    }

    /// Collects saved records in memory.
    #[derive(Default)]
    struct StubStore {
        saved: Mutex<Vec<AnalysisRecord>>,
    }

    impl RecordStore for StubStore {
        async fn save(&self, mut record: AnalysisRecord) -> StdResult<AnalysisRecord, StoreError> {
            let mut saved = self.saved.lock().await;
            record.id = Some(format!("stub-{}", saved.len()));
            saved.push(record.clone());
            Ok(record)
        }

        async fn recent(&self, limit: usize) -> StdResult<Vec<AnalysisRecord>, StoreError> {
            Ok(self
                .saved
                .lock()
                .await
                .iter()
                .rev()
                .take(limit)
                .cloned()
                .collect())
        }

        async fn find_by_url(&self, url: &str) -> StdResult<Option<AnalysisRecord>, StoreError> {
            Ok(self
                .saved
                .lock()
                .await
                .iter()
                .find(|r| r.source == url)
                .cloned())
        }

        async fn clear_all(&self) -> StdResult<usize, StoreError> {
            let mut saved = self.saved.lock().await;
            let n = saved.len();
            saved.clear();
            Ok(n)
        }

        async fn stats(&self) -> StdResult<crate::models::StoreStats, StoreError> {
            unimplemented!("not needed by pipeline tests")
        }
    }

    fn pipeline_with(analyzer: StubAnalyzer) -> Pipeline<StubAnalyzer, StubStore> {
        Pipeline::new(Fetcher::default(), analyzer, StubStore::default())
    }

    #[tokio::test]
    async fn test_text_analysis_end_to_end() {
        let pipeline = pipeline_with(StubAnalyzer::positive());

        let record = pipeline
            .analyze_text("This product exceeded all my expectations and works great!")
            .await
            .unwrap();

        assert_eq!(record.sentiment, Sentiment::Positive);
        assert_eq!(record.score, 0.95);
        assert!((record.breakdown.positive - 0.95).abs() < 1e-9);
        assert!((record.breakdown.neutral - 0.03).abs() < 1e-9);
        assert!((record.breakdown.negative - 0.02).abs() < 1e-9);
        assert_eq!(record.source, TEXT_INPUT_SOURCE);
        assert_eq!(record.heading, TEXT_INPUT_HEADING);
        assert!(record.id.is_some(), "record should have been persisted");
    }

    #[tokio::test]
    async fn test_short_text_is_rejected_before_any_model_call() {
        let pipeline = pipeline_with(StubAnalyzer {
            label: "POSITIVE",
            score: 0.95,
            fail: true,
        });

        match pipeline.analyze_text("too short").await {
            Err(PipelineError::Validation(msg)) => assert!(msg.contains("10 characters")),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_body_length_gate_boundary() {
        let pipeline = pipeline_with(StubAnalyzer::positive());

        // 49 characters of body text fails the gate, 50 passes. The paragraph
        // goes through the extractor's whole-document scan unchanged.
        let body_49 = "a".repeat(49);
        let html = format!("<html><body><p>{body_49}</p></body></html>");
        match pipeline.analyze_fetched("https://example.com/a", &html).await {
            Err(PipelineError::Content(_)) => {}
            other => panic!("expected Content error, got {other:?}"),
        }

        let body_50 = "a".repeat(50);
        let html = format!("<html><body><p>{body_50}</p></body></html>");
        let record = pipeline
            .analyze_fetched("https://example.com/a", &html)
            .await
            .unwrap();
        assert_eq!(record.sentiment, Sentiment::Positive);
    }

    #[tokio::test]
    async fn test_invalid_url_is_a_validation_error() {
        let pipeline = pipeline_with(StubAnalyzer::positive());

        for bad in ["not a url", "ftp://example.com/x", "https://"] {
            match pipeline.analyze_url(bad).await {
                Err(PipelineError::Validation(_)) => {}
                other => panic!("expected Validation for {bad:?}, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_unreachable_url_surfaces_fetch_error_with_url() {
        // Single fast attempt against a port nothing is listening on.
        let fetcher = Fetcher::new(vec![FetchAttemptConfig {
            tls_mode: crate::fetch::TlsMode::Strict,
            timeout_seconds: 2,
            downgrade_to_http: false,
        }]);
        let pipeline = Pipeline::new(fetcher, StubAnalyzer::positive(), StubStore::default());

        let url = "http://127.0.0.1:1/article";
        match pipeline.analyze_url(url).await {
            Err(e @ PipelineError::Fetch { .. }) => {
                assert!(e.to_string().contains(url));
            }
            other => panic!("expected Fetch error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_classifier_failure_is_terminal() {
        let pipeline = pipeline_with(StubAnalyzer {
            label: "POSITIVE",
            score: 0.95,
            fail: true,
        });

        match pipeline
            .analyze_text("a perfectly reasonable stretch of text to analyze")
            .await
        {
            Err(PipelineError::Classification(_)) => {}
            other => panic!("expected Classification, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unrecognized_label_defaults_to_neutral() {
        let pipeline = pipeline_with(StubAnalyzer {
            label: "SOMETHING_ELSE",
            score: 0.7,
            fail: false,
        });

        let record = pipeline
            .analyze_text("a perfectly reasonable stretch of text to analyze")
            .await
            .unwrap();
        assert_eq!(record.sentiment, Sentiment::Neutral);
        assert_eq!(record.breakdown.neutral, 0.6);
        assert!(record.breakdown.is_normalized());
    }

    #[test]
    fn test_analysis_window_caps_long_bodies() {
        let body = "x".repeat(5000);
        let window = analysis_window("Heading", &body);
        assert_eq!(window.chars().count(), ANALYSIS_WINDOW_CHARS);
    }

    #[test]
    fn test_analysis_window_widens_short_bodies_with_heading() {
        let window = analysis_window("A Heading", "short body");
        assert!(window.starts_with("A Heading. short body"));
    }

    #[test]
    fn test_fetch_hint_names_known_blockers() {
        let hint = fetch_hint("https://www.reuters.com/world/some-story");
        assert!(hint.contains("reuters.com"));

        let hint = fetch_hint("https://example.com/story");
        assert!(hint.contains("different URL"));
    }
}
