use gemini_live_types::audio::{CHANNEL_COUNT, FRAME_LENGTH, INPUT_SAMPLE_RATE};
#[cfg(test)]
use mockall::automock;

use crate::error::CaptureError;
use crate::events::EventSender;

/// One fixed-length block of mono microphone samples, normalized to `[-1.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureConfig {
    sample_rate: u32,
    channels: u16,
    frame_length: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: INPUT_SAMPLE_RATE,
            channels: CHANNEL_COUNT,
            frame_length: FRAME_LENGTH,
        }
    }
}

impl CaptureConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_frame_length(mut self, frame_length: usize) -> Self {
        self.frame_length = frame_length;
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn frame_length(&self) -> usize {
        self.frame_length
    }
}

pub type FrameCallback = Box<dyn FnMut(AudioFrame) + Send>;

/// A microphone that delivers fixed-size frames to a callback.
///
/// `stop` must be idempotent and must be safe to call on a source that was
/// never started. Once it returns, the callback is never invoked again and
/// the device is released.
#[cfg_attr(test, automock)]
pub trait AudioCaptureSource {
    fn start(
        &mut self,
        config: &CaptureConfig,
        on_frame: FrameCallback,
        events: EventSender,
    ) -> Result<(), CaptureError>;

    fn stop(&mut self);
}

/// Regroups arbitrarily sized sample blocks into frames of exactly `frame_length`.
#[derive(Debug)]
pub struct FrameAssembler {
    frame_length: usize,
    sample_rate: u32,
    pending: Vec<f32>,
}

impl FrameAssembler {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            frame_length: config.frame_length(),
            sample_rate: config.sample_rate(),
            pending: Vec::with_capacity(config.frame_length() * 2),
        }
    }

    /// Appends samples and emits every frame that became complete.
    pub fn push(&mut self, samples: &[f32], mut emit: impl FnMut(AudioFrame)) {
        self.pending.extend_from_slice(samples);
        while self.pending.len() >= self.frame_length {
            let rest = self.pending.split_off(self.frame_length);
            let frame = std::mem::replace(&mut self.pending, rest);
            emit(AudioFrame::new(frame, self.sample_rate));
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
