mod transcription;
mod consts;

pub use transcription::AudioTranscriptionConfig;
pub use consts::*;
