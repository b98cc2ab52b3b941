/// Enables server-side transcription of one audio direction.
///
/// The service takes an empty object; its presence is what turns transcription on.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AudioTranscriptionConfig {}

impl AudioTranscriptionConfig {
    pub fn new() -> Self {
        Self::default()
    }
}
