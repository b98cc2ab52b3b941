use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use voice_session_core::generate::split_suggestions;
use voice_session_core::{GenerateRequest, GeneratedContent};

/// Mime type for an attachment, from its file extension.
pub fn mime_for(path: &Path) -> Result<&'static str> {
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "png" => Ok("image/png"),
        "jpg" | "jpeg" => Ok("image/jpeg"),
        "webp" => Ok("image/webp"),
        "pdf" => Ok("application/pdf"),
        "txt" | "md" => Ok("text/plain"),
        other => Err(anyhow::anyhow!(
            "Unsupported attachment type {:?}: {}",
            other,
            path.display()
        )),
    }
}

pub fn build_request(
    prompt: &str,
    instructions: Option<&str>,
    attachment: Option<&Path>,
    schema: Option<&Path>,
) -> Result<GenerateRequest> {
    let mut request = GenerateRequest::new(prompt);
    if let Some(instructions) = instructions {
        request = request.with_system_instruction(instructions);
    }
    if let Some(path) = attachment {
        let mime_type = mime_for(path)?;
        let data = fs::read(path)
            .with_context(|| format!("Failed to read attachment: {}", path.display()))?;
        request = request.with_attachment(mime_type, data);
    }
    if let Some(path) = schema {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read schema: {}", path.display()))?;
        let value: serde_json::Value = serde_json::from_str(&text)
            .with_context(|| format!("Schema is not valid JSON: {}", path.display()))?;
        request = request.with_response_schema(value);
    }
    Ok(request)
}

/// Formats a generated answer for the terminal.
pub fn render(content: &GeneratedContent) -> Result<String> {
    match content {
        GeneratedContent::Structured(value) => Ok(serde_json::to_string_pretty(value)?),
        GeneratedContent::Text(text) => {
            let (answer, suggestions) = split_suggestions(text);
            let mut out = answer;
            if !suggestions.is_empty() {
                out.push_str("\n\nWhat to study next:");
                for suggestion in suggestions {
                    out.push_str("\n - ");
                    out.push_str(&suggestion);
                }
            }
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn request_carries_attachment_and_schema() -> Result<()> {
        let dir = tempdir()?;
        let image = dir.path().join("homework.PNG");
        fs::File::create(&image)?.write_all(&[0x89, 0x50, 0x4e, 0x47])?;
        let schema = dir.path().join("quiz.json");
        fs::File::create(&schema)?.write_all(br#"{"type":"ARRAY"}"#)?;

        let request = build_request("Check my work", Some("Be kind."), Some(&image), Some(&schema))?;

        assert_eq!(request.prompt, "Check my work");
        assert_eq!(request.system_instruction.as_deref(), Some("Be kind."));
        assert_eq!(request.attachments.len(), 1);
        assert_eq!(request.attachments[0].mime_type, "image/png");
        assert_eq!(request.attachments[0].data, vec![0x89, 0x50, 0x4e, 0x47]);
        assert_eq!(request.response_schema, Some(serde_json::json!({"type": "ARRAY"})));
        Ok(())
    }

    #[test]
    fn bad_inputs_are_reported() -> Result<()> {
        let dir = tempdir()?;
        let schema = dir.path().join("broken.json");
        fs::File::create(&schema)?.write_all(b"{not json")?;

        assert!(build_request("q", None, None, Some(&schema)).is_err());
        assert!(build_request("q", None, Some(&dir.path().join("scan.tiff")), None).is_err());
        assert!(build_request("q", None, Some(&dir.path().join("missing.png")), None).is_err());
        Ok(())
    }

    #[test]
    fn text_answers_list_suggestions() -> Result<()> {
        let content = GeneratedContent::Text("Answer.\n[SUGGESTIONS]\nFractions\nRatios\n".to_string());
        assert_eq!(
            render(&content)?,
            "Answer.\n\nWhat to study next:\n - Fractions\n - Ratios"
        );

        let plain = GeneratedContent::Text("Just text".to_string());
        assert_eq!(render(&plain)?, "Just text");
        Ok(())
    }

    #[test]
    fn structured_answers_are_pretty_printed() -> Result<()> {
        let content = GeneratedContent::Structured(serde_json::json!({"a": 1}));
        assert_eq!(render(&content)?, "{\n  \"a\": 1\n}");
        Ok(())
    }
}
