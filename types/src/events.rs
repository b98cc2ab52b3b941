mod server;

pub use server::*;

use crate::content::Blob;
use crate::session::Setup;

/// Messages the client writes to the Live socket.
///
/// Serialized externally tagged, which is the service's envelope:
/// `{"setup": {...}}` or `{"realtimeInput": {...}}`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(Setup),
    RealtimeInput(RealtimeInput),
}

impl ClientMessage {
    pub fn setup(setup: Setup) -> Self {
        ClientMessage::Setup(setup)
    }

    /// One captured microphone frame.
    pub fn media_chunk(blob: Blob) -> Self {
        ClientMessage::RealtimeInput(RealtimeInput {
            media_chunks: vec![blob],
            audio_stream_end: None,
        })
    }

    /// Tells the service the microphone stopped so it can flush buffered input.
    pub fn audio_stream_end() -> Self {
        ClientMessage::RealtimeInput(RealtimeInput {
            media_chunks: vec![],
            audio_stream_end: Some(true),
        })
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    media_chunks: Vec<Blob>,
    #[serde(skip_serializing_if = "Option::is_none")]
    audio_stream_end: Option<bool>,
}

impl RealtimeInput {
    pub fn media_chunks(&self) -> &[Blob] {
        &self.media_chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::INPUT_AUDIO_MIME;

    #[test]
    fn test_media_chunk_wire_format() {
        let msg = ClientMessage::media_chunk(Blob::new("AAAA".to_string(), INPUT_AUDIO_MIME));
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(
            json,
            r#"{"realtimeInput":{"mediaChunks":[{"data":"AAAA","mimeType":"audio/pcm;rate=16000"}]}}"#
        );
    }

    #[test]
    fn test_audio_stream_end_wire_format() {
        let json = serde_json::to_string(&ClientMessage::audio_stream_end()).unwrap();
        assert_eq!(json, r#"{"realtimeInput":{"audioStreamEnd":true}}"#);
    }
}
