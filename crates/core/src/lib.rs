pub mod capture;
pub mod controller;
pub mod error;
pub mod events;
pub mod generate;
pub mod playback;
pub mod transcript;
pub mod transport;

pub use capture::{AudioCaptureSource, AudioFrame, CaptureConfig, FrameAssembler, FrameCallback};
pub use controller::{
    SessionCommand, SessionHandle, SessionState, SessionView, VoiceSessionController,
};
pub use error::{CaptureError, DecodeError, OutputError, SessionError, TransportError};
pub use events::{EventSender, SessionEvent};
pub use generate::{ContentGenerator, GeminiTextClient, GenerateRequest, GeneratedContent};
pub use playback::{
    AudioBuffer, AudioOutput, HandleId, HandleState, PlaybackClock, PlaybackHandle,
    PlaybackScheduler,
};
pub use transcript::{Role, TranscriptAggregator, TranscriptTurn};
pub use transport::live::LiveTransport;
pub use transport::{
    EncodedFrame, FrameSender, LiveSessionConfig, SessionTransport, TransportEvent,
};
