use crate::audio::{AudioTranscriptionConfig, Modality, Voice};
use crate::content::{Content, Part};

/// Payload of the first message on a Live connection.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    /// Fully qualified model name, ex: "models/gemini-2.5-flash-native-audio-preview-09-2025"
    model: String,

    generation_config: GenerationConfig,

    /// System instructions prepended to the conversation.
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,

    /// Present when the service should transcribe the user's speech.
    #[serde(skip_serializing_if = "Option::is_none")]
    input_audio_transcription: Option<AudioTranscriptionConfig>,

    /// Present when the service should transcribe its own speech.
    #[serde(skip_serializing_if = "Option::is_none")]
    output_audio_transcription: Option<AudioTranscriptionConfig>,
}

impl Setup {
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn generation_config(&self) -> &GenerationConfig {
        &self.generation_config
    }

    pub fn system_instruction(&self) -> Option<&Content> {
        self.system_instruction.as_ref()
    }

    pub fn transcribes_input(&self) -> bool {
        self.input_audio_transcription.is_some()
    }

    pub fn transcribes_output(&self) -> bool {
        self.output_audio_transcription.is_some()
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    response_modalities: Vec<Modality>,
    #[serde(skip_serializing_if = "Option::is_none")]
    speech_config: Option<SpeechConfig>,
}

impl GenerationConfig {
    pub fn response_modalities(&self) -> &[Modality] {
        &self.response_modalities
    }

    pub fn voice(&self) -> Option<&Voice> {
        self.speech_config
            .as_ref()
            .map(|c| &c.voice_config.prebuilt_voice_config.voice_name)
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    voice_config: VoiceConfig,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    voice_name: Voice,
}

pub struct SetupConfigurator {
    setup: Setup,
}

impl SetupConfigurator {
    /// Audio responses with both transcription directions enabled.
    pub fn new(model: &str) -> Self {
        Self {
            setup: Setup {
                model: qualify_model(model),
                generation_config: GenerationConfig {
                    response_modalities: vec![Modality::Audio],
                    speech_config: None,
                },
                system_instruction: None,
                input_audio_transcription: Some(AudioTranscriptionConfig::new()),
                output_audio_transcription: Some(AudioTranscriptionConfig::new()),
            },
        }
    }

    pub fn with_response_modalities(mut self, modalities: Vec<Modality>) -> Self {
        self.setup.generation_config.response_modalities = modalities;
        self
    }

    pub fn with_instructions(mut self, instructions: &str) -> Self {
        self.setup.system_instruction = Some(Content::new(vec![Part::text(instructions)]));
        self
    }

    pub fn with_voice(mut self, voice: Voice) -> Self {
        self.setup.generation_config.speech_config = Some(SpeechConfig {
            voice_config: VoiceConfig {
                prebuilt_voice_config: PrebuiltVoiceConfig { voice_name: voice },
            },
        });
        self
    }

    pub fn with_input_audio_transcription_disable(mut self) -> Self {
        self.setup.input_audio_transcription = None;
        self
    }

    pub fn with_output_audio_transcription_disable(mut self) -> Self {
        self.setup.output_audio_transcription = None;
        self
    }

    pub fn build(self) -> Setup {
        self.setup
    }
}

fn qualify_model(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{}", model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_setup_wire_format() {
        let setup = SetupConfigurator::new("gemini-2.5-flash-native-audio-preview-09-2025").build();
        let json = serde_json::to_value(&setup).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "model": "models/gemini-2.5-flash-native-audio-preview-09-2025",
                "generationConfig": { "responseModalities": ["AUDIO"] },
                "inputAudioTranscription": {},
                "outputAudioTranscription": {}
            })
        );
    }

    #[test]
    fn test_setup_with_voice_and_instructions() {
        let setup = SetupConfigurator::new("models/live")
            .with_voice(Voice::Kore)
            .with_instructions("Be brief.")
            .with_output_audio_transcription_disable()
            .build();
        assert_eq!(setup.model(), "models/live");
        assert_eq!(setup.generation_config().voice(), Some(&Voice::Kore));
        assert!(setup.transcribes_input());
        assert!(!setup.transcribes_output());

        let json = serde_json::to_value(&setup).unwrap();
        assert_eq!(
            json["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]["voiceName"],
            "Kore"
        );
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "Be brief.");
    }
}
