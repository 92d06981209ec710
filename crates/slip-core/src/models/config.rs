//! Configuration structures for receipt extraction.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::expense::Category;

/// Main configuration for slip.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SlipConfig {
    /// Inference API configuration.
    pub api: ApiConfig,

    /// Instruction prompt configuration.
    pub prompt: PromptConfig,
}

/// Inference API connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the Generative Language API.
    pub base_url: String,

    /// Model name used in the `generateContent` path.
    pub model: String,

    /// Name of the environment variable holding the API key.
    pub api_key_env: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// MIME type declared for the uploaded image.
    pub mime_type: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-2.0-flash".to_string(),
            api_key_env: "GOOGLE_API_KEY".to_string(),
            timeout_secs: 30,
            // Declared regardless of the actual file type.
            mime_type: "image/jpeg".to_string(),
        }
    }
}

/// Instruction sent alongside the image.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Text part asking the model for a bare expense JSON object.
    pub instruction: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            instruction: default_instruction(),
        }
    }
}

fn default_instruction() -> String {
    let categories = Category::ALL
        .iter()
        .map(Category::as_str)
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"Analyze this receipt and return JSON with these fields:
{{
  "merchant": "merchant name",
  "amount": total_amount,
  "date": "YYYY-MM-DD",
  "category": "category_from_list",
  "description": "brief_description",
  "items": [
    {{"name": "item1", "quantity": 1, "price": 0.00}}
  ]
}}

Categories: {categories}

Return only valid JSON, no markdown or additional text."#
    )
}

impl SlipConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }

    /// Full `generateContent` URL for the configured model.
    pub fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.api.base_url.trim_end_matches('/'),
            self.api.model
        )
    }

    /// Request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }
}
