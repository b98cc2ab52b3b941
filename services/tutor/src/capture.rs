use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FrameCount, StreamConfig};
use rubato::{FastFixedIn, Resampler};
use voice_session_core::{
    AudioCaptureSource, AudioFrame, CaptureConfig, CaptureError, EventSender, FrameAssembler,
    FrameCallback,
};

use crate::config::INPUT_CHUNK_SIZE;

/// Turns raw device callbacks into fixed frames at the capture rate:
/// downmix, resample, then regroup.
pub struct InputPipeline {
    channels: usize,
    resampler: Option<FastFixedIn<f32>>,
    pending: Vec<f32>,
    assembler: FrameAssembler,
}

impl InputPipeline {
    pub fn new(device_rate: u32, channels: usize, config: &CaptureConfig) -> anyhow::Result<Self> {
        let resampler = if device_rate == config.sample_rate() {
            None
        } else {
            Some(gemini_live_utils::audio::create_resampler(
                device_rate as f64,
                config.sample_rate() as f64,
                INPUT_CHUNK_SIZE,
            )?)
        };
        Ok(Self {
            channels: channels.max(1),
            resampler,
            pending: Vec::with_capacity(INPUT_CHUNK_SIZE * 2),
            assembler: FrameAssembler::new(config),
        })
    }

    pub fn push(&mut self, interleaved: &[f32], mut emit: impl FnMut(AudioFrame)) {
        let mono = gemini_live_utils::audio::downmix(interleaved, self.channels);
        let Some(resampler) = self.resampler.as_mut() else {
            self.assembler.push(&mono, emit);
            return;
        };
        self.pending.extend(mono);
        loop {
            let needed = resampler.input_frames_next();
            if self.pending.len() < needed {
                break;
            }
            let block: Vec<f32> = self.pending.drain(..needed).collect();
            match resampler.process(&[block.as_slice()], None) {
                Ok(resampled) => {
                    if let Some(samples) = resampled.first() {
                        self.assembler.push(samples, &mut emit);
                    }
                }
                Err(e) => tracing::warn!("Failed to resample microphone block: {}", e),
            }
        }
    }
}

/// Microphone capture on a cpal input stream.
///
/// The stream lives on the thread that started it; dropping it releases the device.
pub struct CpalCapture {
    device_name: Option<String>,
    stream: Option<cpal::Stream>,
}

impl CpalCapture {
    pub fn new(device_name: Option<String>) -> Self {
        Self {
            device_name,
            stream: None,
        }
    }
}

impl AudioCaptureSource for CpalCapture {
    fn start(
        &mut self,
        config: &CaptureConfig,
        mut on_frame: FrameCallback,
        events: EventSender,
    ) -> Result<(), CaptureError> {
        if self.stream.is_some() {
            tracing::debug!("microphone already running");
            return Ok(());
        }

        let input = gemini_live_utils::device::get_or_default_input(self.device_name.as_deref())
            .map_err(|e| {
                tracing::error!("Failed to get audio input device: {:#}", e);
                CaptureError::NoDevice
            })?;
        if let Ok(name) = input.name() {
            tracing::info!("Using input device: {:?}", name);
        }

        let default_config = input
            .default_input_config()
            .map_err(|e| CaptureError::Stream(e.to_string()))?;
        let stream_config = StreamConfig {
            channels: default_config.channels(),
            sample_rate: default_config.sample_rate(),
            buffer_size: cpal::BufferSize::Fixed(FrameCount::from(INPUT_CHUNK_SIZE as u32)),
        };
        tracing::info!("Input stream config: {:?}", &stream_config);

        let mut pipeline = InputPipeline::new(
            stream_config.sample_rate.0,
            stream_config.channels as usize,
            config,
        )
        .map_err(|e| CaptureError::Stream(e.to_string()))?;

        let input_data_fn = move |data: &[f32], _: &cpal::InputCallbackInfo| {
            pipeline.push(data, |frame| on_frame(frame));
        };
        let stream = input
            .build_input_stream(
                &stream_config,
                input_data_fn,
                move |err| {
                    tracing::error!("An error occurred on input stream: {}", err);
                    events.capture_failed(err.to_string());
                },
                None,
            )
            .map_err(|e| CaptureError::Stream(e.to_string()))?;
        stream
            .play()
            .map_err(|e| CaptureError::Stream(e.to_string()))?;

        self.stream = Some(stream);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                tracing::debug!("Failed to pause input stream: {}", e);
            }
            drop(stream);
            tracing::info!("microphone released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_rate_mono_passes_straight_through() {
        let config = CaptureConfig::default().with_frame_length(4);
        let mut pipeline = InputPipeline::new(16_000, 1, &config).unwrap();
        let mut frames = Vec::new();

        pipeline.push(&[0.1, 0.2, 0.3, 0.4, 0.5], |f| frames.push(f));

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].samples(), &[0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn stereo_is_downmixed_before_framing() {
        let config = CaptureConfig::default().with_frame_length(2);
        let mut pipeline = InputPipeline::new(16_000, 2, &config).unwrap();
        let mut frames = Vec::new();

        pipeline.push(&[0.5, 0.25, -0.5, -0.25], |f| frames.push(f));

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].samples(), &[0.375, -0.375]);
    }

    #[test]
    fn device_rate_is_resampled_into_full_frames() {
        let config = CaptureConfig::default();
        let mut pipeline = InputPipeline::new(48_000, 2, &config).unwrap();
        let mut frames = Vec::new();

        // two seconds of stereo silence at 48 kHz, delivered in device-sized callbacks
        let callback = vec![0.0f32; INPUT_CHUNK_SIZE * 2];
        for _ in 0..(48_000 * 2 / INPUT_CHUNK_SIZE) {
            pipeline.push(&callback, |f| frames.push(f));
        }

        // ~32000 samples at 16 kHz, minus what is still buffered
        assert!(frames.len() >= 6, "got {} frames", frames.len());
        assert!(frames.iter().all(|f| f.len() == 4096 && f.sample_rate() == 16_000));
    }
}
