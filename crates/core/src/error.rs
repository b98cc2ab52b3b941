pub use gemini_live_utils::audio::DecodeError;

use crate::controller::SessionState;

/// Session-level failures, as surfaced to whoever drives the controller.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    /// Microphone or speaker could not be acquired. Not retried.
    #[error("Microphone unavailable. Grant permission and try again. ({0})")]
    Acquisition(String),
    /// The connection failed or dropped. The engine never reconnects on its own.
    #[error("Voice connection lost. Start a new session to reconnect. ({0})")]
    Transport(String),
    #[error("invalid session transition {from} -> {to}")]
    InvalidState { from: SessionState, to: SessionState },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CaptureError {
    #[error("no input device available")]
    NoDevice,
    #[error("input device rejected the stream: {0}")]
    Stream(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OutputError {
    #[error("no output device available")]
    NoDevice,
    #[error("output device rejected the stream: {0}")]
    Stream(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("transport is already open")]
    AlreadyOpen,
    #[error("transport failed: {0}")]
    Failed(String),
}

impl From<CaptureError> for SessionError {
    fn from(e: CaptureError) -> Self {
        SessionError::Acquisition(e.to_string())
    }
}

impl From<OutputError> for SessionError {
    fn from(e: OutputError) -> Self {
        SessionError::Acquisition(e.to_string())
    }
}

impl From<TransportError> for SessionError {
    fn from(e: TransportError) -> Self {
        SessionError::Transport(e.to_string())
    }
}
