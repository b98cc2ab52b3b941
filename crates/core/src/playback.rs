use std::collections::BTreeMap;
use std::fmt;

use crate::error::OutputError;
use crate::events::EventSender;

/// Identifies one scheduled source for the lifetime of an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandleId(u64);

impl HandleId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Decoded mono audio ready for the output device.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Seconds of audio; zero for an empty buffer.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Monotonic time of the audio output, in seconds.
pub trait PlaybackClock {
    fn current_time(&self) -> f64;
}

/// An output device that can start buffers at absolute clock times.
///
/// A source that finishes on its own is reported with
/// [`EventSender::playback_ended`]. A stopped source is not reported.
pub trait AudioOutput: PlaybackClock {
    fn open(&mut self, events: EventSender) -> Result<(), OutputError>;

    fn play_at(&mut self, id: HandleId, buffer: AudioBuffer, start_time: f64);

    /// Stopping a source that already ended is a no-op.
    fn stop(&mut self, id: HandleId);

    fn close(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HandleState {
    Scheduled,
    Playing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackHandle {
    id: HandleId,
    start_time: f64,
    duration: f64,
    state: HandleState,
}

impl PlaybackHandle {
    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    pub fn state(&self) -> HandleState {
        self.state
    }
}

/// Places inbound chunks back to back on the output clock.
///
/// Every chunk starts at `max(next_start_time, now)`, which keeps
/// consecutive chunks gapless while the queue is ahead of the clock and
/// never schedules into the past after an underrun.
pub struct PlaybackScheduler<O> {
    output: O,
    next_start_time: f64,
    next_id: u64,
    handles: BTreeMap<HandleId, PlaybackHandle>,
}

impl<O: AudioOutput> PlaybackScheduler<O> {
    pub fn new(output: O) -> Self {
        Self {
            output,
            next_start_time: 0.0,
            next_id: 0,
            handles: BTreeMap::new(),
        }
    }

    pub fn open(&mut self, events: EventSender) -> Result<(), OutputError> {
        self.output.open(events)?;
        self.handles.clear();
        self.reset();
        Ok(())
    }

    /// Moves the cursor to the current clock time.
    pub fn reset(&mut self) {
        self.next_start_time = self.output.current_time();
    }

    /// Schedules a chunk. Empty buffers are skipped.
    pub fn enqueue(&mut self, buffer: AudioBuffer) -> Option<PlaybackHandle> {
        if buffer.is_empty() {
            return None;
        }
        let now = self.output.current_time();
        let start_time = self.next_start_time.max(now);
        let duration = buffer.duration();
        let id = HandleId(self.next_id);
        self.next_id += 1;

        self.output.play_at(id, buffer, start_time);
        self.next_start_time = start_time + duration;

        let handle = PlaybackHandle {
            id,
            start_time,
            duration,
            state: if start_time <= now {
                HandleState::Playing
            } else {
                HandleState::Scheduled
            },
        };
        tracing::trace!(
            "scheduled {} at {:.3}s for {:.3}s (now {:.3}s)",
            id,
            start_time,
            duration,
            now
        );
        self.handles.insert(id, handle.clone());
        Some(handle)
    }

    /// Forgets a handle whose source finished. Unknown ids are ignored.
    pub fn on_ended(&mut self, id: HandleId) -> bool {
        self.handles.remove(&id).is_some()
    }

    /// Stops every outstanding source and resets the cursor to now.
    pub fn stop_all(&mut self) -> usize {
        let stopped = self.handles.len();
        for id in std::mem::take(&mut self.handles).into_keys() {
            self.output.stop(id);
        }
        self.reset();
        if stopped > 0 {
            tracing::debug!("stopped {} playback sources", stopped);
        }
        stopped
    }

    pub fn close(&mut self) {
        self.stop_all();
        self.output.close();
    }

    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    pub fn outstanding(&self) -> usize {
        self.handles.len()
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut O {
        &mut self.output
    }
}
