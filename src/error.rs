//! Pipeline error taxonomy.
//!
//! Every failure the pipeline can produce maps to one of these variants, and
//! each renders a message the caller can put in front of a user as-is. All
//! variants are recoverable at the pipeline boundary; nothing here crashes the
//! process, and a fresh request is always a fresh attempt.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Bad input. Never reaches the network.
    #[error("{0}")]
    Validation(String),

    /// No fetch configuration produced usable HTML for the URL.
    #[error("unable to access {url}. {hint}")]
    Fetch { url: String, hint: String },

    /// HTML was obtained but contained no usable text.
    #[error("{0}")]
    Content(String),

    /// The external model call failed or returned an empty result.
    #[error("{0}")]
    Classification(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
