//! Error types for the slip-core library.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for receipt extraction.
///
/// Every variant is terminal for the call that produced it; nothing is
/// retried.
#[derive(Error, Debug)]
pub enum ReceiptError {
    /// The receipt image could not be read.
    #[error("failed to read image {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The request payload could not be serialized.
    #[error("failed to serialize request: {0}")]
    Serialization(#[source] serde_json::Error),

    /// Transport failure or timeout talking to the inference API.
    ///
    /// The wrapped error carries no URL, since the URL holds the API key.
    #[error("inference API request failed: {0}")]
    Network(#[source] reqwest::Error),

    /// The inference API answered with a non-200 status.
    #[error("inference API error: {status} - {body}")]
    Api { status: String, body: String },

    /// The response envelope was not the expected JSON.
    #[error("failed to decode inference API response: {0}")]
    Decode(#[source] serde_json::Error),

    /// The envelope decoded but held no candidate text.
    #[error("no valid response from inference API")]
    EmptyResponse,

    /// The candidate text was not an expense JSON object.
    #[error("failed to parse expense from model output: {0}")]
    Parse(#[source] serde_json::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ReceiptError {
    /// Whether this is a network error caused by the request timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ReceiptError::Network(e) if e.is_timeout())
    }
}

/// Result type for the slip library.
pub type Result<T> = std::result::Result<T, ReceiptError>;
