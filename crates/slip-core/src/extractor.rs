//! Receipt extraction through the Gemini inference API.

use std::fmt;
use std::path::Path;
use std::time::Instant;

use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use tracing::{debug, info};

use crate::error::{ReceiptError, Result};
use crate::gemini::{GenerateContentRequest, GenerateContentResponse};
use crate::models::config::SlipConfig;
use crate::models::expense::ScannedExpense;

/// Turns receipt images into [`ScannedExpense`] records.
///
/// Holds only immutable settings and a pooled HTTP client, so one
/// extractor can serve any number of independent calls.
pub struct ReceiptExtractor {
    http: Client,
    endpoint: String,
    api_key: String,
    mime_type: String,
    instruction: String,
}

impl ReceiptExtractor {
    /// Create an extractor with the API key read from the environment.
    ///
    /// Fails with [`ReceiptError::Config`] if the variable named by
    /// `api.api_key_env` is unset or empty.
    pub fn from_config(config: &SlipConfig) -> Result<Self> {
        let var = &config.api.api_key_env;
        let api_key = std::env::var(var)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ReceiptError::Config(format!("environment variable {var} is not set")))?;

        Self::new(config, api_key)
    }

    /// Create an extractor with an explicit API key.
    pub fn new(config: &SlipConfig, api_key: impl Into<String>) -> Result<Self> {
        if config.api.timeout_secs == 0 {
            return Err(ReceiptError::Config(
                "api.timeout_secs must be greater than zero".to_string(),
            ));
        }

        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(ReceiptError::Network)?;

        Ok(Self {
            http,
            endpoint: config.endpoint(),
            api_key: api_key.into(),
            mime_type: config.api.mime_type.clone(),
            instruction: config.prompt.instruction.clone(),
        })
    }

    /// Endpoint requests are sent to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Extract an expense from the image at `image_path`.
    ///
    /// Makes exactly one request; any failure is returned as-is.
    pub async fn extract(&self, image_path: impl AsRef<Path>) -> Result<ScannedExpense> {
        let path = image_path.as_ref();
        let start = Instant::now();

        let image = tokio::fs::read(path).await.map_err(|source| ReceiptError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Read {} bytes from {}", image.len(), path.display());

        let request = GenerateContentRequest::image_with_instruction(
            &self.mime_type,
            STANDARD.encode(&image),
            &self.instruction,
        );
        let body = serde_json::to_vec(&request).map_err(ReceiptError::Serialization)?;

        info!("Sending receipt {} to {}", path.display(), self.endpoint);

        let response = self
            .http
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| ReceiptError::Network(e.without_url()))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(ReceiptError::Api {
                status: status.to_string(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ReceiptError::Network(e.without_url()))?;
        let envelope: GenerateContentResponse =
            serde_json::from_slice(&bytes).map_err(ReceiptError::Decode)?;

        let text = envelope.first_text().ok_or(ReceiptError::EmptyResponse)?;
        debug!("Model returned {} characters", text.len());

        let expense = ScannedExpense::from_model_text(text)?;

        info!(
            "Extracted expense {} ({} items) in {:?}",
            expense.id,
            expense.items.len(),
            start.elapsed()
        );

        Ok(expense)
    }
}

impl fmt::Debug for ReceiptExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceiptExtractor")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("mime_type", &self.mime_type)
            .finish_non_exhaustive()
    }
}
