use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Reads every `*.md` file in `dir_path`, keyed by file stem.
pub fn load_prompts(dir_path: &Path) -> Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();

    for entry in fs::read_dir(dir_path)
        .with_context(|| format!("Failed to read prompts directory: {}", dir_path.display()))?
    {
        let path = entry?.path();
        if !path.is_file() || path.extension().and_then(|s| s.to_str()) != Some("md") {
            continue;
        }
        let key = path
            .file_stem()
            .and_then(|s| s.to_str())
            .context("Could not get file stem for prompt file")?
            .to_string();
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read prompt file: {}", path.display()))?;
        prompts.insert(key, content);
    }

    Ok(prompts)
}

/// The trimmed prompt for `key`, or `None` when it is missing or blank.
pub fn instructions<'a>(prompts: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    prompts
        .get(key)
        .map(|text| text.trim())
        .filter(|text| !text.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn loads_markdown_prompts_by_stem() -> Result<()> {
        let dir = tempdir()?;
        let dir_path = dir.path();

        let mut live = File::create(dir_path.join("live_tutor.md"))?;
        writeln!(live, "You are a patient tutor. Keep answers short.")?;
        let mut chat = File::create(dir_path.join("chat_tutor.md"))?;
        writeln!(chat, "End with [SUGGESTIONS].")?;
        let mut ignored = File::create(dir_path.join("notes.txt"))?;
        writeln!(ignored, "not a prompt")?;
        std::fs::create_dir(dir_path.join("drafts.md"))?;

        let prompts = load_prompts(dir_path)?;

        assert_eq!(prompts.len(), 2, "Should only load .md files");
        assert_eq!(
            prompts.get("live_tutor").unwrap(),
            "You are a patient tutor. Keep answers short.\n"
        );
        assert!(prompts.contains_key("chat_tutor"));
        assert!(!prompts.contains_key("notes"));
        assert!(!prompts.contains_key("drafts"));

        Ok(())
    }

    #[test]
    fn missing_directory_is_an_error() {
        let result = load_prompts(Path::new("nonexistent_dir_for_testing_prompts"));
        assert!(result.is_err());
    }

    #[test]
    fn instructions_skip_blank_prompts() -> Result<()> {
        let dir = tempdir()?;
        File::create(dir.path().join("live_tutor.md"))?.write_all(b"  \n")?;
        File::create(dir.path().join("chat_tutor.md"))?.write_all(b"\nBe kind.\n")?;

        let prompts = load_prompts(dir.path())?;

        assert_eq!(instructions(&prompts, "live_tutor"), None);
        assert_eq!(instructions(&prompts, "chat_tutor"), Some("Be kind."));
        assert_eq!(instructions(&prompts, "absent"), None);
        Ok(())
    }
}
