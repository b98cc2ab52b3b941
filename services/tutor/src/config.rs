//! Runtime configuration for the tutor binary.
//!
//! Everything comes from the environment (optionally seeded from a `.env`
//! file) so the same binary runs against different models and voices.

use std::env;
use std::path::PathBuf;

use gemini_live_types::audio::Voice;
use tracing::Level;

/// Frames per device callback on the microphone stream.
pub const INPUT_CHUNK_SIZE: usize = 1024;
/// Frames per device callback on the speaker stream.
pub const OUTPUT_CHUNK_SIZE: usize = 1024;

/// Prompt file stems looked up in the prompts directory.
pub const LIVE_PROMPT: &str = "live_tutor";
pub const CHAT_PROMPT: &str = "chat_tutor";

pub const DEFAULT_LIVE_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";
pub const DEFAULT_CHAT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_PROMPTS_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/prompts");

#[derive(Debug, Clone)]
pub struct Config {
    pub gemini_api_key: String,
    pub live_model: String,
    pub chat_model: String,
    pub live_voice: Option<Voice>,
    pub prompts_dir: PathBuf,
    pub log_level: Level,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid log level provided for RUST_LOG: {0}")]
    InvalidLogLevel(String),
}

impl Config {
    /// Loads configuration from the process environment.
    ///
    // *   `GEMINI_API_KEY`: required for both voice and text.
    // *   `LIVE_MODEL`, `CHAT_MODEL`: optional model overrides.
    // *   `LIVE_VOICE`: optional prebuilt voice name, e.g. "Kore".
    // *   `PROMPTS_DIR`: optional, defaults to the prompts shipped with this crate.
    // *   `RUST_LOG`: optional, "TRACE" through "ERROR", defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let gemini_api_key = lookup("GEMINI_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingVar("GEMINI_API_KEY".to_string()))?;

        let live_model = lookup("LIVE_MODEL").unwrap_or_else(|| DEFAULT_LIVE_MODEL.to_string());
        let chat_model = lookup("CHAT_MODEL").unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string());
        let live_voice = lookup("LIVE_VOICE")
            .filter(|name| !name.trim().is_empty())
            .map(|name| Voice::from(name.trim()));
        let prompts_dir = lookup("PROMPTS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PROMPTS_DIR));

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidLogLevel(log_level_str))?;

        Ok(Self {
            gemini_api_key,
            live_model,
            chat_model,
            live_voice,
            prompts_dir,
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_key_is_set() {
        let config = Config::from_lookup(lookup(&[("GEMINI_API_KEY", "secret")])).unwrap();

        assert_eq!(config.gemini_api_key, "secret");
        assert_eq!(config.live_model, DEFAULT_LIVE_MODEL);
        assert_eq!(config.chat_model, DEFAULT_CHAT_MODEL);
        assert_eq!(config.live_voice, None);
        assert_eq!(config.prompts_dir, PathBuf::from(DEFAULT_PROMPTS_DIR));
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    fn missing_or_blank_key_is_an_error() {
        assert!(matches!(
            Config::from_lookup(lookup(&[])),
            Err(ConfigError::MissingVar(_))
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("GEMINI_API_KEY", "  ")])),
            Err(ConfigError::MissingVar(_))
        ));
    }

    #[test]
    fn overrides_are_read() {
        let config = Config::from_lookup(lookup(&[
            ("GEMINI_API_KEY", "secret"),
            ("LIVE_MODEL", "live-x"),
            ("CHAT_MODEL", "chat-y"),
            ("LIVE_VOICE", "Kore"),
            ("PROMPTS_DIR", "/etc/tutor"),
            ("RUST_LOG", "debug"),
        ]))
        .unwrap();

        assert_eq!(config.live_model, "live-x");
        assert_eq!(config.chat_model, "chat-y");
        assert_eq!(config.live_voice, Some(Voice::Kore));
        assert_eq!(config.prompts_dir, PathBuf::from("/etc/tutor"));
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    fn invalid_log_level_is_rejected() {
        let result = Config::from_lookup(lookup(&[
            ("GEMINI_API_KEY", "secret"),
            ("RUST_LOG", "chatty"),
        ]));
        assert!(matches!(result, Err(ConfigError::InvalidLogLevel(level)) if level == "chatty"));
    }
}
