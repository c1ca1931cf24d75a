//! Resilient page fetching with an ordered list of fallback configurations.
//!
//! News sites fail in many ways: slow origins, broken certificate chains,
//! TLS-terminating middleboxes, and plain bot-blocking. Instead of one client
//! configuration, the fetcher walks a fixed sequence of
//! [`FetchAttemptConfig`]s, strictest first, and stops at the first attempt
//! that produces a response worth parsing. There is no backoff and no retry
//! beyond the list; a fresh call is a fresh sequence.
//!
//! A response is only accepted when the status code is in the successful set,
//! the body is long enough to plausibly be a page, and it contains at least
//! one HTML structural marker. Everything else is logged and skipped.

use once_cell::sync::Lazy;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONNECTION, USER_AGENT,
};
use reqwest::redirect::Policy;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use url::Url;

const ACCEPTED_STATUS: [u16; 3] = [200, 201, 202];
const MIN_HTML_BYTES: usize = 500;
const HTML_MARKERS: [&str; 4] = ["<html", "<body", "<article", "<div"];
const MAX_REDIRECTS: usize = 10;

/// Fixed browser-like header set sent with every attempt.
static BROWSER_HEADERS: Lazy<HeaderMap> = Lazy::new(|| {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_static(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
             (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        ),
    );
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(
        HeaderName::from_static("upgrade-insecure-requests"),
        HeaderValue::from_static("1"),
    );
    headers
});

/// How strictly an attempt verifies the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    /// Full certificate verification.
    Strict,
    /// Certificate verification disabled.
    Relaxed,
    /// No TLS expectations at all; pairs with a scheme downgrade.
    None,
}

/// One entry of the fallback sequence: TLS posture, time bound, and whether
/// to rewrite `https` to `http` before sending.
#[derive(Debug, Clone)]
pub struct FetchAttemptConfig {
    pub tls_mode: TlsMode,
    pub timeout_seconds: u64,
    pub downgrade_to_http: bool,
}

impl FetchAttemptConfig {
    /// The default sequence: strict and patient, then lenient, then plain
    /// HTTP as a last resort.
    pub fn default_sequence() -> Vec<Self> {
        vec![
            Self {
                tls_mode: TlsMode::Strict,
                timeout_seconds: 15,
                downgrade_to_http: false,
            },
            Self {
                tls_mode: TlsMode::Relaxed,
                timeout_seconds: 20,
                downgrade_to_http: false,
            },
            Self {
                tls_mode: TlsMode::None,
                timeout_seconds: 15,
                downgrade_to_http: true,
            },
        ]
    }
}

/// Typed fetch failure. Transport errors never escape the fetcher directly;
/// the caller decides user-facing messaging.
#[derive(Debug, Error)]
pub enum FetchFailure {
    #[error("'{url}' is not a well-formed http(s) URL")]
    InvalidUrl { url: String },

    #[error("all {attempts} fetch attempts failed for {url}")]
    Exhausted { url: String, attempts: usize },
}

type AttemptError = Box<dyn std::error::Error + Send + Sync>;

/// Fetches raw HTML for a URL by walking the configured attempt sequence.
pub struct Fetcher {
    attempts: Vec<FetchAttemptConfig>,
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::new(FetchAttemptConfig::default_sequence())
    }
}

impl Fetcher {
    pub fn new(attempts: Vec<FetchAttemptConfig>) -> Self {
        Self { attempts }
    }

    /// Retrieve raw HTML for `url`.
    ///
    /// Validates the URL before touching the network, then tries each
    /// configuration in order. Returns the first adequate body, or
    /// [`FetchFailure::Exhausted`] once the sequence is spent.
    #[instrument(level = "info", skip(self))]
    pub async fn fetch(&self, url: &str) -> Result<String, FetchFailure> {
        let parsed = Url::parse(url)
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
            .ok_or_else(|| FetchFailure::InvalidUrl {
                url: url.to_string(),
            })?;

        for (i, attempt) in self.attempts.iter().enumerate() {
            match try_attempt(&parsed, attempt).await {
                Ok(body) => {
                    info!(
                        attempt = i + 1,
                        bytes = body.len(),
                        tls_mode = ?attempt.tls_mode,
                        "Fetched page"
                    );
                    return Ok(body);
                }
                Err(e) => {
                    warn!(
                        attempt = i + 1,
                        of = self.attempts.len(),
                        tls_mode = ?attempt.tls_mode,
                        error = %e,
                        "Fetch attempt failed"
                    );
                }
            }
        }

        warn!(attempts = self.attempts.len(), "All fetch attempts failed");
        Err(FetchFailure::Exhausted {
            url: url.to_string(),
            attempts: self.attempts.len(),
        })
    }
}

/// Run a single configured attempt against the URL.
async fn try_attempt(url: &Url, config: &FetchAttemptConfig) -> Result<String, AttemptError> {
    let mut builder = Client::builder()
        .timeout(Duration::from_secs(config.timeout_seconds))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .default_headers(BROWSER_HEADERS.clone());
    if config.tls_mode != TlsMode::Strict {
        builder = builder.danger_accept_invalid_certs(true);
    }
    let client = builder.build()?;

    let mut target = url.clone();
    if config.downgrade_to_http && target.scheme() == "https" {
        target
            .set_scheme("http")
            .map_err(|_| "could not downgrade scheme to http")?;
    }

    let response = client.get(target.clone()).send().await?;
    let status = response.status();
    if !ACCEPTED_STATUS.contains(&status.as_u16()) {
        return Err(format!("unexpected status {status}").into());
    }

    let body = response.text().await?;
    if !looks_like_page(&body) {
        return Err(format!("response body inadequate ({} bytes)", body.len()).into());
    }

    debug!(url = %target, bytes = body.len(), "Attempt produced usable HTML");
    Ok(body)
}

/// Adequacy gate: long enough and structurally recognizable as HTML.
fn looks_like_page(body: &str) -> bool {
    if body.len() <= MIN_HTML_BYTES {
        return false;
    }
    let lowered = body.to_lowercase();
    HTML_MARKERS.iter().any(|marker| lowered.contains(marker))
}
