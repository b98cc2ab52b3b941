use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use gemini_live_types::{Blob, Content, Part};
#[cfg(test)]
use mockall::automock;
use reqwest::Client;
use serde::Deserialize;

pub const GENERATE_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

const SUGGESTION_MARKER: &str = "[SUGGESTIONS]";

/// Inline bytes sent alongside a prompt, such as a photo of homework.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub mime_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateRequest {
    pub prompt: String,
    pub system_instruction: Option<String>,
    pub attachments: Vec<Attachment>,
    /// When set, the answer is requested and parsed as JSON of this shape.
    pub response_schema: Option<serde_json::Value>,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_attachment(mut self, mime_type: &str, data: Vec<u8>) -> Self {
        self.attachments.push(Attachment {
            mime_type: mime_type.to_string(),
            data,
        });
        self
    }

    pub fn with_response_schema(mut self, schema: serde_json::Value) -> Self {
        self.response_schema = Some(schema);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GeneratedContent {
    Structured(serde_json::Value),
    Text(String),
}

/// One-shot text generation, kept apart from the live voice session.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ContentGenerator {
    async fn generate(&self, request: GenerateRequest) -> Result<GeneratedContent>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

pub struct GeminiTextClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiTextClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            base_url: GENERATE_BASE_URL.to_string(),
            api_key,
            model,
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl ContentGenerator for GeminiTextClient {
    async fn generate(&self, request: GenerateRequest) -> Result<GeneratedContent> {
        let body = request_body(&request);
        tracing::debug!(
            model = %self.model,
            attachments = request.attachments.len(),
            structured = request.response_schema.is_some(),
            "generating content"
        );

        let resp = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .context("generateContent request failed")?
            .error_for_status()
            .context("generateContent returned an error status")?
            .json::<GenerateResponse>()
            .await
            .context("unreadable generateContent response")?;

        let text = response_text(&resp)?;
        if request.response_schema.is_some() {
            let value: serde_json::Value = serde_json::from_str(text.trim())
                .map_err(|e| anyhow::anyhow!("Failed to parse structured response: {e}"))?;
            Ok(GeneratedContent::Structured(value))
        } else {
            Ok(GeneratedContent::Text(text))
        }
    }
}

fn request_body(request: &GenerateRequest) -> serde_json::Value {
    let mut parts: Vec<Part> = request
        .attachments
        .iter()
        .map(|a| {
            Part::inline(Blob::new(
                general_purpose::STANDARD.encode(&a.data),
                &a.mime_type,
            ))
        })
        .collect();
    parts.push(Part::text(&request.prompt));

    let mut body = serde_json::json!({
        "contents": [Content::new(parts).with_role("user")],
    });
    if let Some(ref instruction) = request.system_instruction {
        body["systemInstruction"] = serde_json::json!(Content::new(vec![Part::text(instruction)]));
    }
    if let Some(ref schema) = request.response_schema {
        body["generationConfig"] = serde_json::json!({
            "responseMimeType": "application/json",
            "responseSchema": schema,
        });
    }
    body
}

fn response_text(resp: &GenerateResponse) -> Result<String> {
    let content = resp
        .candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .ok_or_else(|| anyhow::anyhow!("No response from model"))?;
    Ok(content
        .parts()
        .iter()
        .filter_map(|p| p.as_text())
        .collect::<Vec<_>>()
        .join(""))
}

/// Splits a chat answer into the displayable text and the follow-up
/// suggestions listed after a `[SUGGESTIONS]` line.
pub fn split_suggestions(text: &str) -> (String, Vec<String>) {
    match text.find(SUGGESTION_MARKER) {
        Some(index) => {
            let answer = text[..index].trim().to_string();
            let suggestions = text[index + SUGGESTION_MARKER.len()..]
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect();
            (answer, suggestions)
        }
        None => (text.to_string(), Vec::new()),
    }
}
