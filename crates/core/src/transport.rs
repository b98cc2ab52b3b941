use std::fmt;
use std::sync::Arc;

use gemini_live_types::audio::{CHANNEL_COUNT, Voice, pcm_mime_type};
#[cfg(test)]
use mockall::automock;

use crate::capture::AudioFrame;
use crate::error::TransportError;
use crate::events::EventSender;

pub mod live;

/// A captured frame converted to base64 PCM16 little-endian, ready for the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFrame {
    data: String,
    sample_rate: u32,
    channels: u16,
}

impl EncodedFrame {
    pub fn encode(frame: &AudioFrame) -> Self {
        Self {
            data: gemini_live_utils::audio::encode(frame.samples()),
            sample_rate: frame.sample_rate(),
            channels: CHANNEL_COUNT,
        }
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn mime_type(&self) -> String {
        pcm_mime_type(self.sample_rate)
    }
}

/// Cheap, cloneable handle for pushing frames from the capture callback.
///
/// Sending never blocks; a transport that cannot keep up drops frames.
#[derive(Clone)]
pub struct FrameSender {
    send: Arc<dyn Fn(EncodedFrame) + Send + Sync>,
}

impl FrameSender {
    pub fn new(send: impl Fn(EncodedFrame) + Send + Sync + 'static) -> Self {
        Self {
            send: Arc::new(send),
        }
    }

    pub fn send(&self, frame: EncodedFrame) {
        (self.send)(frame)
    }
}

impl fmt::Debug for FrameSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameSender").finish_non_exhaustive()
    }
}

/// Inbound traffic, already split into one event per concern.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Opened,
    UserTranscript(String),
    AssistantTranscript(String),
    /// Base64 PCM16 mono at the output rate.
    Audio(String),
    TurnComplete,
    Interrupted,
    Closed { reason: Option<String> },
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiveSessionConfig {
    model: String,
    instructions: Option<String>,
    voice: Option<Voice>,
}

impl LiveSessionConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            instructions: None,
            voice: None,
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_voice(mut self, voice: Voice) -> Self {
        self.voice = Some(voice);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn instructions(&self) -> Option<&str> {
        self.instructions.as_deref()
    }

    pub fn voice(&self) -> Option<&Voice> {
        self.voice.as_ref()
    }
}

/// A bidirectional connection to the remote model.
///
/// `open` only starts connecting. Readiness, inbound content, closure and
/// failure are all reported through `events`.
#[cfg_attr(test, automock)]
pub trait SessionTransport {
    fn open(&mut self, config: &LiveSessionConfig, events: EventSender)
    -> Result<(), TransportError>;

    /// Available once the transport reported [`TransportEvent::Opened`].
    fn frame_sender(&self) -> Option<FrameSender>;

    /// Idempotent. No events are delivered for this connection afterwards.
    fn close(&mut self);
}

#[cfg(test)]
mod test {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn silence_frame_encodes_to_zero_bytes() {
        let frame = AudioFrame::new(vec![0.0; 4096], 16_000);
        let encoded = EncodedFrame::encode(&frame);
        let bytes = gemini_live_utils::audio::decode(encoded.data()).unwrap();
        assert_eq!(bytes.len(), 8192);
        assert!(bytes.iter().all(|b| *b == 0));
        assert_eq!(encoded.mime_type(), "audio/pcm;rate=16000");
        assert_eq!(encoded.channels(), 1);
    }

    #[test]
    fn frame_sender_forwards_to_closure() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let sender = FrameSender::new(move |frame| sink.lock().unwrap().push(frame));
        let frame = EncodedFrame::encode(&AudioFrame::new(vec![0.5; 4], 16_000));

        sender.clone().send(frame.clone());
        sender.send(frame.clone());

        assert_eq!(*seen.lock().unwrap(), vec![frame.clone(), frame]);
    }
}
