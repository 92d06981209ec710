//! Wire types for the Gemini `generateContent` endpoint.

use serde::{Deserialize, Serialize};

/// Request body.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
}

/// An ordered block of parts, used in both directions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// One text or inline-data unit within a content block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

/// Base64 payload tagged with its MIME type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

/// Response envelope.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

/// One alternative answer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub content: Content,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }

    pub fn inline_data(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: mime_type.into(),
                data: data.into(),
            }),
        }
    }
}

impl GenerateContentRequest {
    /// A single content block holding the image followed by the instruction.
    pub fn image_with_instruction(mime_type: &str, base64_data: String, instruction: &str) -> Self {
        Self {
            contents: vec![Content {
                parts: vec![
                    Part::inline_data(mime_type, base64_data),
                    Part::text(instruction),
                ],
            }],
        }
    }
}

impl GenerateContentResponse {
    /// Text of the first part of the first candidate.
    ///
    /// `None` when there are no candidates or the first one has no parts.
    /// A part without a text field yields an empty string.
    pub fn first_text(&self) -> Option<&str> {
        let part = self.candidates.first()?.content.parts.first()?;
        Some(part.text.as_deref().unwrap_or(""))
    }
}
