use crate::content::{Blob, Content};

/// One message read from the Live socket.
///
/// The service does not tag its messages; each carries at most a handful of
/// optional top-level fields and a single frame can mix transcript text,
/// audio and turn signals.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    setup_complete: Option<SetupComplete>,
    #[serde(skip_serializing_if = "Option::is_none")]
    server_content: Option<ServerContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    go_away: Option<GoAway>,
    #[serde(skip_serializing_if = "Option::is_none")]
    usage_metadata: Option<UsageMetadata>,
}

impl ServerMessage {
    pub fn is_setup_complete(&self) -> bool {
        self.setup_complete.is_some()
    }

    pub fn server_content(&self) -> Option<&ServerContent> {
        self.server_content.as_ref()
    }

    pub fn go_away(&self) -> Option<&GoAway> {
        self.go_away.as_ref()
    }

    pub fn usage_metadata(&self) -> Option<&UsageMetadata> {
        self.usage_metadata.as_ref()
    }

    pub fn with_server_content(mut self, content: ServerContent) -> Self {
        self.server_content = Some(content);
        self
    }

    pub fn with_setup_complete(mut self) -> Self {
        self.setup_complete = Some(SetupComplete {});
        self
    }
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct SetupComplete {}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    model_turn: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    turn_complete: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    interrupted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    input_transcription: Option<Transcription>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_transcription: Option<Transcription>,
}

impl ServerContent {
    pub fn model_turn(&self) -> Option<&Content> {
        self.model_turn.as_ref()
    }

    /// Every audio payload of the model turn, in part order.
    pub fn audio_chunks(&self) -> impl Iterator<Item = &Blob> {
        self.model_turn
            .iter()
            .flat_map(|turn| turn.parts())
            .filter_map(|part| part.inline_data())
            .filter(|blob| blob.is_audio())
    }

    pub fn is_turn_complete(&self) -> bool {
        self.turn_complete == Some(true)
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted == Some(true)
    }

    pub fn input_transcription(&self) -> Option<&str> {
        self.input_transcription.as_ref().and_then(|t| t.text.as_deref())
    }

    pub fn output_transcription(&self) -> Option<&str> {
        self.output_transcription.as_ref().and_then(|t| t.text.as_deref())
    }

    pub fn with_model_turn(mut self, turn: Content) -> Self {
        self.model_turn = Some(turn);
        self
    }

    pub fn with_turn_complete(mut self) -> Self {
        self.turn_complete = Some(true);
        self
    }

    pub fn with_interrupted(mut self) -> Self {
        self.interrupted = Some(true);
        self
    }

    pub fn with_input_transcription(mut self, text: &str) -> Self {
        self.input_transcription = Some(Transcription {
            text: Some(text.to_string()),
        });
        self
    }

    pub fn with_output_transcription(mut self, text: &str) -> Self {
        self.output_transcription = Some(Transcription {
            text: Some(text.to_string()),
        });
        self
    }
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Transcription {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

/// Notice that the server will close the connection soon.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    time_left: Option<String>,
}

impl GoAway {
    pub fn time_left(&self) -> Option<&str> {
        self.time_left.as_deref()
    }
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: i32,
    #[serde(default)]
    response_token_count: i32,
    #[serde(default)]
    total_token_count: i32,
}

impl UsageMetadata {
    pub fn prompt_token_count(&self) -> i32 {
        self.prompt_token_count
    }

    pub fn response_token_count(&self) -> i32 {
        self.response_token_count
    }

    pub fn total_token_count(&self) -> i32 {
        self.total_token_count
    }
}
