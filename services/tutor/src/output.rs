use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FrameCount, StreamConfig};
use gemini_live_types::audio::OUTPUT_SAMPLE_RATE;
use rubato::{FastFixedIn, Resampler};
use voice_session_core::{
    AudioBuffer, AudioOutput, EventSender, HandleId, OutputError, PlaybackClock,
};

use crate::config::OUTPUT_CHUNK_SIZE;

struct Source {
    id: HandleId,
    start_frame: u64,
    samples: Vec<f32>,
}

impl Source {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// Frame-accurate mono mixer at the source rate.
///
/// Time is the number of frames rendered so far, so the clock only moves
/// while the device is pulling audio.
pub struct Timeline {
    sample_rate: u32,
    frames_rendered: u64,
    sources: Vec<Source>,
}

impl Timeline {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            frames_rendered: 0,
            sources: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn current_time(&self) -> f64 {
        self.frames_rendered as f64 / self.sample_rate as f64
    }

    /// `samples` must already be at the timeline's rate.
    pub fn schedule(&mut self, id: HandleId, samples: Vec<f32>, start_time: f64) {
        let start_frame = (start_time * self.sample_rate as f64).round().max(0.0) as u64;
        self.sources.push(Source {
            id,
            start_frame,
            samples,
        });
    }

    pub fn stop(&mut self, id: HandleId) -> bool {
        let before = self.sources.len();
        self.sources.retain(|source| source.id != id);
        before != self.sources.len()
    }

    pub fn clear(&mut self) {
        self.sources.clear();
    }

    pub fn scheduled(&self) -> usize {
        self.sources.len()
    }

    /// Mixes the next `out.len()` frames and returns the sources that finished in them.
    pub fn render(&mut self, out: &mut [f32]) -> Vec<HandleId> {
        out.fill(0.0);
        let window_start = self.frames_rendered;
        let window_end = window_start + out.len() as u64;

        for source in &self.sources {
            let from = source.start_frame.max(window_start);
            let to = source.end_frame().min(window_end);
            for frame in from..to {
                out[(frame - window_start) as usize] +=
                    source.samples[(frame - source.start_frame) as usize];
            }
        }
        self.frames_rendered = window_end;

        let mut finished = Vec::new();
        self.sources.retain(|source| {
            if source.end_frame() <= window_end {
                finished.push(source.id);
                false
            } else {
                true
            }
        });
        finished
    }
}

/// Feeds a device buffer from a shared [`Timeline`].
///
/// One resampler converts the mixed signal for the whole life of the
/// stream, so chunk boundaries on the timeline stay seamless at any device
/// rate. Never blocks: if the timeline is locked, the buffer is filled from
/// what is already converted and padded with silence.
pub struct DeviceRenderer {
    timeline: Arc<Mutex<Timeline>>,
    channels: usize,
    resampler: Option<FastFixedIn<f32>>,
    block: Vec<f32>,
    pending: VecDeque<f32>,
}

impl DeviceRenderer {
    pub fn new(
        timeline: Arc<Mutex<Timeline>>,
        source_rate: u32,
        device_rate: u32,
        channels: usize,
    ) -> anyhow::Result<Self> {
        let resampler = if source_rate == device_rate {
            None
        } else {
            Some(gemini_live_utils::audio::create_resampler(
                source_rate as f64,
                device_rate as f64,
                OUTPUT_CHUNK_SIZE,
            )?)
        };
        Ok(Self {
            timeline,
            channels: channels.max(1),
            resampler,
            block: Vec::with_capacity(OUTPUT_CHUNK_SIZE),
            pending: VecDeque::with_capacity(OUTPUT_CHUNK_SIZE * 4),
        })
    }

    /// Fills one interleaved device buffer and returns the sources that finished.
    pub fn render(&mut self, out: &mut [f32]) -> Vec<HandleId> {
        let frames = out.len() / self.channels;
        let mut finished = Vec::new();

        while self.pending.len() < frames {
            let needed = match self.resampler {
                Some(ref resampler) => resampler.input_frames_next(),
                None => frames - self.pending.len(),
            };
            self.block.resize(needed, 0.0);
            match self.timeline.try_lock() {
                Ok(mut timeline) => finished.extend(timeline.render(&mut self.block)),
                Err(_) => break,
            }
            match self.resampler {
                Some(ref mut resampler) => match resampler.process(&[self.block.as_slice()], None) {
                    Ok(resampled) => {
                        if let Some(samples) = resampled.first() {
                            self.pending.extend(samples.iter().copied());
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Failed to resample output block: {}", e);
                        break;
                    }
                },
                None => self.pending.extend(self.block.iter().copied()),
            }
        }

        for frame in out.chunks_mut(self.channels) {
            let sample = self.pending.pop_front().unwrap_or(0.0);
            frame.fill(sample);
        }
        finished
    }
}

/// Speaker output on a cpal stream, driven by a [`Timeline`] at 24 kHz.
pub struct CpalOutput {
    device_name: Option<String>,
    timeline: Arc<Mutex<Timeline>>,
    stream: Option<cpal::Stream>,
}

impl CpalOutput {
    pub fn new(device_name: Option<String>) -> Self {
        Self {
            device_name,
            timeline: Arc::new(Mutex::new(Timeline::new(OUTPUT_SAMPLE_RATE))),
            stream: None,
        }
    }
}

impl PlaybackClock for CpalOutput {
    fn current_time(&self) -> f64 {
        self.timeline
            .lock()
            .map(|timeline| timeline.current_time())
            .unwrap_or(0.0)
    }
}

impl AudioOutput for CpalOutput {
    fn open(&mut self, events: EventSender) -> Result<(), OutputError> {
        if self.stream.is_some() {
            return Ok(());
        }

        let output = gemini_live_utils::device::get_or_default_output(self.device_name.as_deref())
            .map_err(|e| {
                tracing::error!("Failed to get audio output device: {:#}", e);
                OutputError::NoDevice
            })?;
        if let Ok(name) = output.name() {
            tracing::info!("Using output device: {:?}", name);
        }

        let default_config = output
            .default_output_config()
            .map_err(|e| OutputError::Stream(e.to_string()))?;
        let stream_config = StreamConfig {
            channels: default_config.channels(),
            sample_rate: default_config.sample_rate(),
            buffer_size: cpal::BufferSize::Fixed(FrameCount::from(OUTPUT_CHUNK_SIZE as u32)),
        };
        tracing::info!("Output stream config: {:?}", &stream_config);

        let timeline = Arc::new(Mutex::new(Timeline::new(OUTPUT_SAMPLE_RATE)));
        self.timeline = timeline.clone();
        let mut renderer = DeviceRenderer::new(
            timeline,
            OUTPUT_SAMPLE_RATE,
            stream_config.sample_rate.0,
            stream_config.channels as usize,
        )
        .map_err(|e| OutputError::Stream(e.to_string()))?;

        let output_data_fn = move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            for id in renderer.render(data) {
                events.playback_ended(id);
            }
        };
        let stream = output
            .build_output_stream(
                &stream_config,
                output_data_fn,
                move |err| tracing::error!("An error occurred on output stream: {}", err),
                None,
            )
            .map_err(|e| OutputError::Stream(e.to_string()))?;
        stream
            .play()
            .map_err(|e| OutputError::Stream(e.to_string()))?;

        self.stream = Some(stream);
        Ok(())
    }

    fn play_at(&mut self, id: HandleId, buffer: AudioBuffer, start_time: f64) {
        if buffer.sample_rate() != OUTPUT_SAMPLE_RATE {
            tracing::warn!(
                "dropping playback chunk {} at {} Hz, expected {} Hz",
                id,
                buffer.sample_rate(),
                OUTPUT_SAMPLE_RATE
            );
            return;
        }
        let samples = buffer.into_samples();
        if let Ok(mut timeline) = self.timeline.lock() {
            timeline.schedule(id, samples, start_time);
        }
    }

    fn stop(&mut self, id: HandleId) {
        if let Ok(mut timeline) = self.timeline.lock() {
            timeline.stop(id);
        }
    }

    fn close(&mut self) {
        if let Ok(mut timeline) = self.timeline.lock() {
            timeline.clear();
        }
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::info!("speaker released");
        }
    }
}
