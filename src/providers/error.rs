//! Defines the custom error type for the `providers` module.

use thiserror::Error;

/// The primary error type for the `providers` module.
///
/// Covers local contract violations, which are detected before any network
/// activity, and vendor failures, which propagate unretried.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// No API key was found in the config file or the environment.
    #[error("No API key configured for {provider}; set it in the config file or via {env_var}")]
    MissingApiKey {
        provider: &'static str,
        env_var: &'static str,
    },

    /// A required text input was empty or blank.
    #[error("Required input '{0}' is empty")]
    EmptyInput(&'static str),

    /// The composed prompt would not fit the selected model's context
    /// window, so the request was never sent.
    #[error("Prompt is {counted} tokens but {model} accepts at most {limit}; request not sent")]
    TokenBudget {
        model: String,
        counted: usize,
        limit: usize,
    },

    /// The requested model name is not in any provider's catalog.
    #[error("Unknown model '{requested}'. Known models: {known}")]
    UnknownModel { requested: String, known: String },

    /// Transport-level failure from the HTTP client.
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The vendor answered with a non-success status.
    #[error("API returned status {status}: {body}")]
    Api { status: u16, body: String },

    /// A request body could not be encoded or a response payload decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A streaming payload arrived in a shape the decoder does not accept.
    #[error("Malformed streaming payload: {0}")]
    Stream(String),
}
