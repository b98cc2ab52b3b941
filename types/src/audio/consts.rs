use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;

/// Sample rate of microphone audio sent to the service.
pub const INPUT_SAMPLE_RATE: u32 = 16000;
/// Sample rate of synthesized audio returned by the service.
pub const OUTPUT_SAMPLE_RATE: u32 = 24000;
/// Both directions are mono.
pub const CHANNEL_COUNT: u16 = 1;
/// Number of samples in one captured frame (~256 ms at 16 kHz).
pub const FRAME_LENGTH: usize = 4096;

pub const INPUT_AUDIO_MIME: &str = "audio/pcm;rate=16000";
pub const OUTPUT_AUDIO_MIME: &str = "audio/pcm;rate=24000";

/// Builds the mime tag for little-endian PCM16 at the given rate.
pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={}", sample_rate)
}

/// Prebuilt voices of the native-audio models.
#[derive(Debug, Clone, PartialEq)]
pub enum Voice {
    Puck,
    Charon,
    Kore,
    Fenrir,
    Aoede,
    Custom(String),
}

impl Voice {
    pub fn as_str(&self) -> &str {
        match self {
            Voice::Puck => "Puck",
            Voice::Charon => "Charon",
            Voice::Kore => "Kore",
            Voice::Fenrir => "Fenrir",
            Voice::Aoede => "Aoede",
            Voice::Custom(s) => s,
        }
    }
}

impl Serialize for Voice {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl From<&str> for Voice {
    fn from(s: &str) -> Self {
        match s {
            "Puck" => Voice::Puck,
            "Charon" => Voice::Charon,
            "Kore" => Voice::Kore,
            "Fenrir" => Voice::Fenrir,
            "Aoede" => Voice::Aoede,
            _ => Voice::Custom(s.to_string()),
        }
    }
}

impl FromStr for Voice {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Voice::from(s))
    }
}

impl<'de> Deserialize<'de> for Voice {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Voice::from(s.as_str()))
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub enum Modality {
    #[serde(rename = "TEXT")]
    Text,
    #[serde(rename = "AUDIO")]
    Audio,
}
