//! Inference API interaction with exponential backoff retry logic.
//!
//! This module provides the interface to the external summarization and
//! sentiment-classification capability. The pipeline treats that capability
//! as opaque: `summarize(text) -> text` and `classify(text) -> (label, score)`.
//!
//! # Architecture
//!
//! The module uses a trait-based design for flexibility:
//! - [`Analyze`]: Core trait defining the async model interaction
//! - [`InferenceClient`]: HTTP implementation speaking the hosted-inference
//!   JSON convention (`POST {base}/{model}` with an `inputs` payload)
//! - [`Backoff`]: Decorator that adds retry logic to any `Analyze`
//!   implementation
//!
//! # Retry Strategy
//!
//! - Maximum 5 retry attempts per call
//! - Exponential backoff starting at 1 second
//! - Maximum delay capped at 30 seconds
//! - Random jitter (0-250ms) added to prevent thundering herd

use crate::utils::truncate_for_log;
use rand::{rng, Rng};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{info, instrument, warn};

/// Default inference endpoint, overridable from the CLI.
pub const DEFAULT_ENDPOINT: &str = "https://api-inference.huggingface.co/models";

/// Default summarization model identifier.
pub const DEFAULT_SUMMARIZATION_MODEL: &str = "t5-small";

/// Default sentiment model identifier.
pub const DEFAULT_SENTIMENT_MODEL: &str = "distilbert-base-uncased-finetuned-sst-2-english";

const REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(60);

pub type ApiError = Box<dyn Error + Send + Sync>;

/// A raw (label, score) pair as returned by the classifier model, before
/// normalization to the canonical sentiment vocabulary.
#[derive(Debug, Clone, Deserialize)]
pub struct RawClassification {
    pub label: String,
    pub score: f64,
}

/// Trait for async access to the summarization/classification capability.
///
/// Implementors send text to a model backend and return one result per call.
/// The abstraction allows decorators (like retry logic) and test stubs to
/// stand in for the real HTTP client.
pub trait Analyze {
    /// Produce a summary of `text` bounded by the given token lengths.
    async fn summarize(&self, text: &str, max_len: u32, min_len: u32) -> Result<String, ApiError>;

    /// Classify the sentiment of `text`.
    async fn classify(&self, text: &str) -> Result<RawClassification, ApiError>;
}

#[derive(Debug, Serialize)]
struct SummarizationRequest<'a> {
    inputs: &'a str,
    parameters: SummarizationParameters,
}

#[derive(Debug, Serialize)]
struct SummarizationParameters {
    max_length: u32,
    min_length: u32,
}

#[derive(Debug, Deserialize)]
struct SummarizationCandidate {
    summary_text: String,
}

#[derive(Debug, Serialize)]
struct ClassificationRequest<'a> {
    inputs: &'a str,
}

/// HTTP client for a hosted inference API.
///
/// Speaks the widely deployed convention of `POST {base}/{model}` with a JSON
/// body carrying `inputs` (plus generation parameters for summarization) and
/// a JSON array response with one candidate list per input. An empty
/// candidate list is a hard error, never silently coerced into a result.
#[derive(Debug, Clone)]
pub struct InferenceClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    summarization_model: String,
    sentiment_model: String,
}

impl InferenceClient {
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        summarization_model: String,
        sentiment_model: String,
    ) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url,
            api_key,
            summarization_model,
            sentiment_model,
        })
    }

    fn model_url(&self, model: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), model)
    }

    async fn post_json<B: Serialize>(
        &self,
        model: &str,
        body: &B,
    ) -> Result<serde_json::Value, ApiError> {
        let mut request = self.client.post(self.model_url(model)).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}

impl Analyze for InferenceClient {
    #[instrument(level = "info", skip_all, fields(model = %self.summarization_model))]
    async fn summarize(&self, text: &str, max_len: u32, min_len: u32) -> Result<String, ApiError> {
        let t0 = Instant::now();
        let body = SummarizationRequest {
            inputs: text,
            parameters: SummarizationParameters {
                max_length: max_len,
                min_length: min_len,
            },
        };
        let value = self.post_json(&self.summarization_model, &body).await?;
        let candidates: Vec<SummarizationCandidate> = serde_json::from_value(value)?;

        let summary = candidates
            .into_iter()
            .next()
            .map(|c| c.summary_text)
            .filter(|s| !s.trim().is_empty())
            .ok_or("summarizer returned no output")?;

        info!(
            elapsed_ms = t0.elapsed().as_millis() as u128,
            chars = summary.len(),
            "Summarization succeeded"
        );
        Ok(summary)
    }

    #[instrument(level = "info", skip_all, fields(model = %self.sentiment_model))]
    async fn classify(&self, text: &str) -> Result<RawClassification, ApiError> {
        let t0 = Instant::now();
        let value = self
            .post_json(&self.sentiment_model, &ClassificationRequest { inputs: text })
            .await?;

        // Classification responses come back either nested (one candidate
        // list per input) or flat, depending on the deployment.
        let candidates: Vec<RawClassification> =
            match serde_json::from_value::<Vec<Vec<RawClassification>>>(value.clone()) {
                Ok(nested) => nested.into_iter().flatten().collect(),
                Err(_) => serde_json::from_value(value.clone()).map_err(|e| {
                    format!(
                        "unrecognized classifier response {}: {e}",
                        truncate_for_log(&value.to_string(), 300)
                    )
                })?,
            };

        let top = candidates
            .into_iter()
            .max_by(|a, b| a.score.total_cmp(&b.score))
            .ok_or("classifier returned no candidates")?;

        info!(
            elapsed_ms = t0.elapsed().as_millis() as u128,
            label = %top.label,
            score = top.score,
            "Classification succeeded"
        );
        Ok(top)
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`Analyze`]
/// implementation.
///
/// This decorator transparently retries transient API failures. It's designed
/// to be resilient against rate limiting, network issues, and temporary
/// server errors.
///
/// # Backoff Strategy
///
/// The delay between retries follows this formula:
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
#[derive(Debug)]
pub struct Backoff<T> {
    /// The underlying model client to wrap.
    inner: T,
    /// Maximum number of retry attempts before giving up.
    max_retries: usize,
    /// Initial delay between retries (doubles with each attempt).
    base_delay: StdDuration,
    /// Maximum delay cap to prevent excessive waiting.
    max_delay: StdDuration,
}

impl<T> Backoff<T>
where
    T: Analyze,
{
    /// Create a new retry wrapper around an existing [`Analyze`] implementation.
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }

    fn delay_for(&self, attempt: usize) -> StdDuration {
        let mut delay = self.base_delay.saturating_mul(1 << (attempt - 1));
        if delay > self.max_delay {
            delay = self.max_delay;
        }
        let jitter_ms: u64 = rng().random_range(0..=250);
        delay + StdDuration::from_millis(jitter_ms)
    }
}

impl<T> Analyze for Backoff<T>
where
    T: Analyze,
{
    #[instrument(level = "info", skip_all)]
    async fn summarize(&self, text: &str, max_len: u32, min_len: u32) -> Result<String, ApiError> {
        let mut attempt = 0usize;
        loop {
            match self.inner.summarize(text, max_len, min_len).await {
                Ok(summary) => return Ok(summary),
                Err(e) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        warn!(attempt, max = self.max_retries, error = %e, "summarize exhausted retries");
                        return Err(e);
                    }
                    let delay = self.delay_for(attempt);
                    warn!(attempt, max = self.max_retries, ?delay, error = %e, "summarize failed; backing off");
                    sleep(delay).await;
                }
            }
        }
    }

    #[instrument(level = "info", skip_all)]
    async fn classify(&self, text: &str) -> Result<RawClassification, ApiError> {
        let mut attempt = 0usize;
        loop {
            match self.inner.classify(text).await {
                Ok(classification) => return Ok(classification),
                Err(e) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        warn!(attempt, max = self.max_retries, error = %e, "classify exhausted retries");
                        return Err(e);
                    }
                    let delay = self.delay_for(attempt);
                    warn!(attempt, max = self.max_retries, ?delay, error = %e, "classify failed; backing off");
                    sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Fails a fixed number of times before succeeding.
    struct Flaky {
        failures: usize,
        calls: Arc<AtomicUsize>,
    }

    impl Analyze for Flaky {
        async fn summarize(
            &self,
            _text: &str,
            _max_len: u32,
            _min_len: u32,
        ) -> Result<String, ApiError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err("transient".into())
            } else {
                Ok("a summary".to_string())
            }
        }

        async fn classify(&self, _text: &str) -> Result<RawClassification, ApiError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err("transient".into())
            } else {
                Ok(RawClassification {
                    label: "POSITIVE".to_string(),
                    score: 0.9,
                })
            }
        }
    }

    #[tokio::test]
    async fn test_backoff_recovers_from_transient_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let flaky = Flaky {
            failures: 2,
            calls: Arc::clone(&calls),
        };
        let api = Backoff::new(flaky, 5, StdDuration::from_millis(1));

        let summary = api.summarize("text", 50, 30).await.unwrap();
        assert_eq!(summary, "a summary");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_backoff_gives_up_after_max_retries() {
        let calls = Arc::new(AtomicUsize::new(0));
        let flaky = Flaky {
            failures: usize::MAX,
            calls: Arc::clone(&calls),
        };
        let api = Backoff::new(flaky, 2, StdDuration::from_millis(1));

        assert!(api.classify("text").await.is_err());
        // Initial call plus two retries.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    /// Serve a fixed JSON response for every connection.
    async fn spawn_json_server(json: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{json}",
                    json.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{addr}")
    }

    fn client_for(base_url: String) -> InferenceClient {
        InferenceClient::new(
            base_url,
            None,
            DEFAULT_SUMMARIZATION_MODEL.to_string(),
            DEFAULT_SENTIMENT_MODEL.to_string(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_classify_parses_nested_candidates() {
        let base = spawn_json_server(
            r#"[[{"label":"POSITIVE","score":0.95},{"label":"NEGATIVE","score":0.05}]]"#
                .to_string(),
        )
        .await;
        let client = client_for(base);

        let top = client.classify("great product").await.unwrap();
        assert_eq!(top.label, "POSITIVE");
        assert!((top.score - 0.95).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_classify_parses_flat_candidates() {
        let base =
            spawn_json_server(r#"[{"label":"NEGATIVE","score":0.87}]"#.to_string()).await;
        let client = client_for(base);

        let top = client.classify("terrible product").await.unwrap();
        assert_eq!(top.label, "NEGATIVE");
    }

    #[tokio::test]
    async fn test_classify_empty_response_is_an_error() {
        let base = spawn_json_server("[]".to_string()).await;
        let client = client_for(base);
        assert!(client.classify("anything").await.is_err());
    }

    #[tokio::test]
    async fn test_summarize_parses_candidate() {
        let base = spawn_json_server(
            r#"[{"summary_text":"A concise summary of the article."}]"#.to_string(),
        )
        .await;
        let client = client_for(base);

        let summary = client.summarize("long text", 50, 30).await.unwrap();
        assert_eq!(summary, "A concise summary of the article.");
    }

    #[tokio::test]
    async fn test_summarize_empty_text_is_an_error() {
        let base = spawn_json_server(r#"[{"summary_text":"  "}]"#.to_string()).await;
        let client = client_for(base);
        assert!(client.summarize("long text", 50, 30).await.is_err());
    }
}
