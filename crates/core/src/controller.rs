use std::fmt;

use anyhow::Context;
use gemini_live_types::audio::OUTPUT_SAMPLE_RATE;
use tokio::sync::{mpsc, watch};

use crate::capture::{AudioCaptureSource, AudioFrame, CaptureConfig, FrameCallback};
use crate::error::SessionError;
use crate::events::{Envelope, EventSender, SessionEvent};
use crate::playback::{AudioBuffer, AudioOutput, PlaybackScheduler};
use crate::transcript::{TranscriptAggregator, TranscriptTurn};
use crate::transport::{EncodedFrame, LiveSessionConfig, SessionTransport, TransportEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Active,
    Closing,
}

impl SessionState {
    fn can_enter(self, to: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, to),
            (Idle, Connecting)
                | (Connecting, Active)
                | (Connecting, Closing)
                | (Active, Closing)
                | (Closing, Idle)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Active => "active",
            SessionState::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// Snapshot published to observers after every change.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionView {
    pub state: SessionState,
    pub conversation: Vec<TranscriptTurn>,
    pub error: Option<SessionError>,
    pub playing: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Start,
    Stop,
}

/// Cancel handle for a controller driven by [`VoiceSessionController::run`].
///
/// The run loop ends, tearing down any live session, once every handle is dropped.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    view: watch::Receiver<SessionView>,
}

impl SessionHandle {
    pub async fn start(&self) -> anyhow::Result<()> {
        self.commands
            .send(SessionCommand::Start)
            .await
            .context("session controller has stopped")
    }

    pub async fn stop(&self) -> anyhow::Result<()> {
        self.commands
            .send(SessionCommand::Stop)
            .await
            .context("session controller has stopped")
    }

    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }
}

/// Owns one voice conversation: its state, its resources and its transcript.
///
/// Components report back by posting [`SessionEvent`]s; all state changes
/// happen here, one event at a time. Every way a session can end goes
/// through the same teardown.
pub struct VoiceSessionController<T, C, O> {
    state: SessionState,
    transport: T,
    capture: C,
    playback: PlaybackScheduler<O>,
    transcript: TranscriptAggregator,
    live_config: LiveSessionConfig,
    capture_config: CaptureConfig,
    error: Option<SessionError>,
    epoch: u64,
    events_tx: mpsc::UnboundedSender<Envelope>,
    events_rx: mpsc::UnboundedReceiver<Envelope>,
    view_tx: watch::Sender<SessionView>,
}

impl<T, C, O> VoiceSessionController<T, C, O>
where
    T: SessionTransport,
    C: AudioCaptureSource,
    O: AudioOutput,
{
    pub fn new(transport: T, capture: C, output: O, live_config: LiveSessionConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (view_tx, _) = watch::channel(SessionView::default());
        Self {
            state: SessionState::Idle,
            transport,
            capture,
            playback: PlaybackScheduler::new(output),
            transcript: TranscriptAggregator::new(),
            live_config,
            capture_config: CaptureConfig::default(),
            error: None,
            epoch: 0,
            events_tx,
            events_rx,
            view_tx,
        }
    }

    pub fn with_capture_config(mut self, capture_config: CaptureConfig) -> Self {
        self.capture_config = capture_config;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn error(&self) -> Option<&SessionError> {
        self.error.as_ref()
    }

    pub fn transcript(&self) -> &TranscriptAggregator {
        &self.transcript
    }

    pub fn playback(&self) -> &PlaybackScheduler<O> {
        &self.playback
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view_tx.subscribe()
    }

    /// A cancel handle plus the command stream to hand to [`Self::run`].
    pub fn handle(&self, capacity: usize) -> (SessionHandle, mpsc::Receiver<SessionCommand>) {
        let (commands, rx) = mpsc::channel(capacity);
        let handle = SessionHandle {
            commands,
            view: self.view_tx.subscribe(),
        };
        (handle, rx)
    }

    /// Begins connecting. A no-op unless idle.
    ///
    /// Failures that happen before the transport reports readiness are
    /// returned here; later ones end the session and show up in the view.
    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Idle {
            tracing::debug!("start ignored while {}", self.state);
            return Ok(());
        }
        self.error = None;
        self.epoch += 1;
        self.set_state(SessionState::Connecting)?;
        tracing::info!(epoch = self.epoch, "voice session connecting");

        let events = self.event_sender();
        if let Err(e) = self.playback.open(events.clone()) {
            let error = SessionError::from(e);
            self.teardown(Some(error.clone()));
            return Err(error);
        }
        self.transcript.begin_exchange();
        if let Err(e) = self.transport.open(&self.live_config, events) {
            let error = SessionError::from(e);
            self.teardown(Some(error.clone()));
            return Err(error);
        }
        self.publish();
        Ok(())
    }

    /// Ends the session. A no-op while idle; safe to repeat.
    pub fn stop(&mut self) {
        self.teardown(None);
    }

    /// Applies one event to the current session.
    pub fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Transport(event) => self.on_transport_event(event),
            SessionEvent::PlaybackEnded(id) => {
                if self.playback.on_ended(id) {
                    tracing::trace!("playback {} finished", id);
                    self.publish();
                }
            }
            SessionEvent::CaptureFailed(message) => {
                tracing::error!("microphone stream failed: {}", message);
                self.teardown(Some(SessionError::Acquisition(message)));
            }
        }
    }

    /// Applies every event already queued, without waiting.
    pub fn process_pending(&mut self) -> usize {
        let mut processed = 0;
        while let Ok(envelope) = self.events_rx.try_recv() {
            self.dispatch(envelope);
            processed += 1;
        }
        processed
    }

    /// Drives the controller until every [`SessionHandle`] is gone.
    pub async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(SessionCommand::Start) => {
                        if let Err(e) = self.start() {
                            tracing::warn!("session failed to start: {}", e);
                        }
                    }
                    Some(SessionCommand::Stop) => self.stop(),
                    None => break,
                },
                Some(envelope) = self.events_rx.recv() => self.dispatch(envelope),
            }
        }
        self.stop();
        tracing::debug!("session controller stopped");
    }

    fn dispatch(&mut self, envelope: Envelope) {
        if envelope.epoch != self.epoch {
            tracing::trace!("discarding event from ended session: {:?}", envelope.event);
            return;
        }
        self.handle_event(envelope.event);
    }

    fn on_transport_event(&mut self, event: TransportEvent) {
        match (self.state, event) {
            (SessionState::Connecting, TransportEvent::Opened) => self.on_opened(),
            (SessionState::Active, TransportEvent::UserTranscript(text)) => {
                self.transcript.on_user_partial(&text);
                self.publish();
            }
            (SessionState::Active, TransportEvent::AssistantTranscript(text)) => {
                self.transcript.on_assistant_partial(&text);
                self.publish();
            }
            (SessionState::Active, TransportEvent::Audio(data)) => self.on_audio(&data),
            (SessionState::Active, TransportEvent::TurnComplete) => {
                self.transcript.on_turn_complete();
                self.publish();
            }
            (SessionState::Active, TransportEvent::Interrupted) => {
                let stopped = self.playback.stop_all();
                tracing::info!(stopped, "assistant interrupted");
                self.publish();
            }
            (SessionState::Connecting, TransportEvent::Closed { reason }) => {
                let reason = reason.unwrap_or_else(|| "closed before ready".to_string());
                self.teardown(Some(SessionError::Transport(reason)));
            }
            (SessionState::Active, TransportEvent::Closed { reason }) => {
                tracing::info!("remote closed the session: {:?}", reason);
                self.teardown(None);
            }
            (SessionState::Connecting | SessionState::Active, TransportEvent::Error(message)) => {
                self.teardown(Some(SessionError::Transport(message)));
            }
            (state, event) => {
                tracing::debug!("ignoring {:?} while {}", event, state);
            }
        }
    }

    fn on_opened(&mut self) {
        self.playback.reset();
        let Some(sender) = self.transport.frame_sender() else {
            self.teardown(Some(SessionError::Transport(
                "transport opened without an outbound channel".to_string(),
            )));
            return;
        };
        let on_frame: FrameCallback =
            Box::new(move |frame: AudioFrame| sender.send(EncodedFrame::encode(&frame)));

        let events = self.event_sender();
        if let Err(e) = self.capture.start(&self.capture_config, on_frame, events) {
            tracing::error!("failed to start microphone: {}", e);
            self.teardown(Some(SessionError::from(e)));
            return;
        }
        if self.set_state(SessionState::Active).is_ok() {
            tracing::info!(epoch = self.epoch, "voice session active");
            self.publish();
        }
    }

    fn on_audio(&mut self, data: &str) {
        match gemini_live_utils::audio::decode_mono(data) {
            Ok(samples) => {
                if let Some(handle) = self
                    .playback
                    .enqueue(AudioBuffer::new(samples, OUTPUT_SAMPLE_RATE))
                {
                    tracing::trace!(handle = %handle.id(), start = handle.start_time(), "audio queued");
                    self.publish();
                }
            }
            Err(e) => {
                tracing::warn!(bytes = data.len(), "dropping malformed audio chunk: {}", e);
            }
        }
    }

    /// The single way out of `connecting` or `active`.
    fn teardown(&mut self, error: Option<SessionError>) {
        if self.set_state(SessionState::Closing).is_err() {
            return;
        }
        self.capture.stop();
        self.transport.close();
        self.playback.close();
        self.transcript.finish();
        // anything still queued or in flight belongs to the ended session
        self.epoch += 1;

        match error {
            Some(ref e) => tracing::error!("voice session ended: {}", e),
            None => tracing::info!("voice session ended"),
        }
        self.error = error;
        if let Err(e) = self.set_state(SessionState::Idle) {
            tracing::error!("{}", e);
        }
        self.publish();
    }

    fn set_state(&mut self, to: SessionState) -> Result<(), SessionError> {
        if !self.state.can_enter(to) {
            tracing::trace!("rejected transition {} -> {}", self.state, to);
            return Err(SessionError::InvalidState {
                from: self.state,
                to,
            });
        }
        tracing::debug!("session {} -> {}", self.state, to);
        self.state = to;
        Ok(())
    }

    fn event_sender(&self) -> EventSender {
        EventSender::new(self.epoch, self.events_tx.clone())
    }

    fn publish(&self) {
        self.view_tx.send_replace(SessionView {
            state: self.state,
            conversation: self.transcript.conversation(),
            error: self.error.clone(),
            playing: self.playback.outstanding(),
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::capture::MockAudioCaptureSource;
    use crate::error::{CaptureError, TransportError};
    use crate::playback::HandleId;
    use crate::playback::fake::FakeOutput;
    use crate::transcript::Role;
    use crate::transport::{FrameSender, MockSessionTransport};

    type TestController = VoiceSessionController<MockSessionTransport, MockAudioCaptureSource, FakeOutput>;

    fn controller(transport: MockSessionTransport, capture: MockAudioCaptureSource) -> TestController {
        let output = FakeOutput {
            now: 3.0,
            ..Default::default()
        };
        VoiceSessionController::new(
            transport,
            capture,
            output,
            LiveSessionConfig::new("test-model"),
        )
    }

    fn transport_expecting_one_session() -> (MockSessionTransport, Arc<Mutex<Vec<EncodedFrame>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let sink = sent.clone();
        let mut transport = MockSessionTransport::new();
        transport.expect_open().times(1).returning(|_, _| Ok(()));
        transport.expect_frame_sender().returning(move || {
            let sink = sink.clone();
            Some(FrameSender::new(move |frame| sink.lock().unwrap().push(frame)))
        });
        transport.expect_close().times(1).return_const(());
        (transport, sent)
    }

    fn quiet_capture() -> MockAudioCaptureSource {
        let mut capture = MockAudioCaptureSource::new();
        capture.expect_start().times(1).returning(|_, _, _| Ok(()));
        capture.expect_stop().times(1).return_const(());
        capture
    }

    fn opened(controller: &mut TestController) {
        controller.start().unwrap();
        controller.handle_event(SessionEvent::Transport(TransportEvent::Opened));
        assert_eq!(controller.state(), SessionState::Active);
    }

    fn audio(seconds: f64) -> SessionEvent {
        let samples = vec![0.0f32; (seconds * 24_000.0).round() as usize];
        SessionEvent::Transport(TransportEvent::Audio(gemini_live_utils::audio::encode(&samples)))
    }

    fn transport(event: TransportEvent) -> SessionEvent {
        SessionEvent::Transport(event)
    }

    #[test]
    fn silence_then_two_chunks_play_back_to_back() {
        let (transport_mock, sent) = transport_expecting_one_session();
        let mut capture = MockAudioCaptureSource::new();
        capture
            .expect_start()
            .times(1)
            .returning(|config, mut on_frame, _| {
                for _ in 0..3 {
                    on_frame(AudioFrame::new(
                        vec![0.0; config.frame_length()],
                        config.sample_rate(),
                    ));
                }
                Ok(())
            });
        capture.expect_stop().times(1).return_const(());
        let mut controller = controller(transport_mock, capture);

        controller.start().unwrap();
        assert_eq!(controller.state(), SessionState::Connecting);
        controller.handle_event(transport(TransportEvent::Opened));
        assert_eq!(controller.state(), SessionState::Active);

        {
            let sent = sent.lock().unwrap();
            assert_eq!(sent.len(), 3);
            for frame in sent.iter() {
                assert_eq!(frame.mime_type(), "audio/pcm;rate=16000");
                let bytes = gemini_live_utils::audio::decode(frame.data()).unwrap();
                assert_eq!(bytes.len(), 8192);
                assert!(bytes.iter().all(|b| *b == 0));
            }
        }

        controller.handle_event(audio(0.5));
        controller.handle_event(audio(0.3));

        let played = &controller.playback().output().played;
        assert_eq!(played.len(), 2);
        let (_, first_start, first_duration) = played[0];
        let (_, second_start, second_duration) = played[1];
        assert_eq!(first_start, 3.0);
        assert_eq!(second_start, first_start + 0.5);
        assert!((first_duration + second_duration - 0.8).abs() < 1e-12);

        controller.stop();
    }

    #[test]
    fn stop_twice_releases_everything_once() {
        let (transport_mock, _) = transport_expecting_one_session();
        let mut controller = controller(transport_mock, quiet_capture());
        opened(&mut controller);
        controller.handle_event(audio(0.5));
        controller.handle_event(audio(0.5));

        controller.stop();
        controller.stop();

        assert_eq!(controller.state(), SessionState::Idle);
        assert_eq!(controller.playback().outstanding(), 0);
        assert_eq!(controller.playback().output().stopped.len(), 2);
        assert_eq!(controller.playback().output().closed, 1);
        assert!(controller.error().is_none());
    }

    #[test]
    fn stop_while_idle_is_a_no_op() {
        let mut transport = MockSessionTransport::new();
        transport.expect_close().times(0);
        let mut capture = MockAudioCaptureSource::new();
        capture.expect_stop().times(0);
        let mut controller = controller(transport, capture);

        controller.stop();

        assert_eq!(controller.state(), SessionState::Idle);
        assert_eq!(controller.playback().output().closed, 0);
    }

    #[test]
    fn start_while_connecting_or_active_is_a_no_op() {
        let (transport_mock, _) = transport_expecting_one_session();
        let mut controller = controller(transport_mock, quiet_capture());

        controller.start().unwrap();
        controller.start().unwrap();
        assert_eq!(controller.state(), SessionState::Connecting);

        controller.handle_event(transport(TransportEvent::Opened));
        controller.start().unwrap();
        assert_eq!(controller.state(), SessionState::Active);
        assert_eq!(controller.playback().output().opened, 1);

        controller.stop();
    }

    #[test]
    fn transport_open_failure_returns_to_idle() {
        let mut transport = MockSessionTransport::new();
        transport
            .expect_open()
            .times(1)
            .returning(|_, _| Err(TransportError::Failed("dns".to_string())));
        transport.expect_close().times(1).return_const(());
        let mut capture = MockAudioCaptureSource::new();
        capture.expect_start().times(0);
        capture.expect_stop().times(1).return_const(());
        let mut controller = controller(transport, capture);

        let err = controller.start().unwrap_err();

        assert!(matches!(err, SessionError::Transport(_)));
        assert_eq!(controller.state(), SessionState::Idle);
        assert_eq!(controller.error(), Some(&err));
        assert_eq!(controller.playback().output().closed, 1);
    }

    #[test]
    fn output_failure_aborts_before_connecting() {
        let mut transport = MockSessionTransport::new();
        transport.expect_open().times(0);
        transport.expect_close().times(1).return_const(());
        let mut capture = MockAudioCaptureSource::new();
        capture.expect_stop().times(1).return_const(());
        let output = FakeOutput {
            fail_open: true,
            ..Default::default()
        };
        let mut controller = VoiceSessionController::new(
            transport,
            capture,
            output,
            LiveSessionConfig::new("test-model"),
        );

        let err = controller.start().unwrap_err();

        assert!(matches!(err, SessionError::Acquisition(_)));
        assert_eq!(controller.state(), SessionState::Idle);
    }

    #[test]
    fn microphone_denied_tears_down_with_acquisition_error() {
        let (transport_mock, sent) = transport_expecting_one_session();
        let mut capture = MockAudioCaptureSource::new();
        capture
            .expect_start()
            .times(1)
            .returning(|_, _, _| Err(CaptureError::Stream("permission denied".to_string())));
        capture.expect_stop().times(1).return_const(());
        let mut controller = controller(transport_mock, capture);

        controller.start().unwrap();
        controller.handle_event(transport(TransportEvent::Opened));

        assert_eq!(controller.state(), SessionState::Idle);
        let err = controller.error().unwrap();
        assert!(matches!(err, SessionError::Acquisition(_)));
        assert!(err.to_string().starts_with("Microphone unavailable."));
        assert!(sent.lock().unwrap().is_empty());
        assert!(controller.transcript().conversation().is_empty());
    }

    #[test]
    fn transport_error_uses_the_same_teardown() {
        let (transport_mock, _) = transport_expecting_one_session();
        let mut controller = controller(transport_mock, quiet_capture());
        opened(&mut controller);
        controller.handle_event(audio(0.5));

        controller.handle_event(transport(TransportEvent::Error("reset by peer".to_string())));

        assert_eq!(controller.state(), SessionState::Idle);
        assert_eq!(
            controller.error(),
            Some(&SessionError::Transport("reset by peer".to_string()))
        );
        assert_eq!(controller.playback().outstanding(), 0);
        assert_eq!(controller.playback().output().stopped.len(), 1);

        controller.stop();
    }

    #[test]
    fn remote_close_ends_session_without_error() {
        let (transport_mock, _) = transport_expecting_one_session();
        let mut controller = controller(transport_mock, quiet_capture());
        opened(&mut controller);
        controller.handle_event(transport(TransportEvent::UserTranscript("hi".to_string())));

        controller.handle_event(transport(TransportEvent::Closed { reason: None }));

        assert_eq!(controller.state(), SessionState::Idle);
        assert!(controller.error().is_none());
        let sealed = controller.transcript().sealed();
        assert_eq!(sealed.len(), 2);
        assert_eq!(sealed[0].text(), "hi");
    }

    #[test]
    fn close_while_connecting_is_a_transport_error() {
        let mut transport_mock = MockSessionTransport::new();
        transport_mock.expect_open().times(1).returning(|_, _| Ok(()));
        transport_mock.expect_close().times(1).return_const(());
        let mut capture = MockAudioCaptureSource::new();
        capture.expect_stop().times(1).return_const(());
        let mut controller = controller(transport_mock, capture);

        controller.start().unwrap();
        controller.handle_event(transport(TransportEvent::Closed {
            reason: Some("invalid api key".to_string()),
        }));

        assert_eq!(controller.state(), SessionState::Idle);
        let err = controller.error().unwrap();
        assert!(err.to_string().starts_with("Voice connection lost."));
        assert!(controller.transcript().conversation().is_empty());
    }

    #[test]
    fn transcript_events_build_the_conversation() {
        let (transport_mock, _) = transport_expecting_one_session();
        let mut controller = controller(transport_mock, quiet_capture());
        opened(&mut controller);

        for event in [
            TransportEvent::UserTranscript("a".to_string()),
            TransportEvent::UserTranscript("ab".to_string()),
            TransportEvent::AssistantTranscript("x".to_string()),
            TransportEvent::TurnComplete,
            TransportEvent::UserTranscript("q".to_string()),
        ] {
            controller.handle_event(transport(event));
        }

        let conversation: Vec<_> = controller
            .transcript()
            .conversation()
            .iter()
            .map(|t| (t.role(), t.text().to_string(), t.is_sealed()))
            .collect();
        assert_eq!(
            conversation,
            vec![
                (Role::User, "ab".to_string(), true),
                (Role::Assistant, "x".to_string(), true),
                (Role::User, "q".to_string(), false),
                (Role::Assistant, "".to_string(), false),
            ]
        );

        controller.stop();
    }

    #[test]
    fn turn_complete_without_text_adds_nothing() {
        let (transport_mock, _) = transport_expecting_one_session();
        let mut controller = controller(transport_mock, quiet_capture());
        opened(&mut controller);

        controller.handle_event(transport(TransportEvent::TurnComplete));

        assert!(controller.transcript().sealed().is_empty());
        controller.stop();
        assert!(controller.transcript().conversation().is_empty());
    }

    #[test]
    fn malformed_audio_is_dropped_and_session_survives() {
        let (transport_mock, _) = transport_expecting_one_session();
        let mut controller = controller(transport_mock, quiet_capture());
        opened(&mut controller);

        controller.handle_event(transport(TransportEvent::Audio("not base64!".to_string())));
        // three bytes cannot hold whole 16-bit samples
        controller.handle_event(transport(TransportEvent::Audio("AQID".to_string())));
        controller.handle_event(audio(0.25));

        assert_eq!(controller.state(), SessionState::Active);
        assert_eq!(controller.playback().output().played.len(), 1);
        controller.stop();
    }

    #[test]
    fn interruption_flushes_playback_and_keeps_session() {
        let (transport_mock, _) = transport_expecting_one_session();
        let mut controller = controller(transport_mock, quiet_capture());
        opened(&mut controller);
        controller.handle_event(audio(0.5));
        controller.handle_event(audio(0.5));

        controller.handle_event(transport(TransportEvent::Interrupted));

        assert_eq!(controller.state(), SessionState::Active);
        assert_eq!(controller.playback().outstanding(), 0);
        assert_eq!(controller.playback().next_start_time(), 3.0);
        controller.handle_event(audio(0.25));
        assert_eq!(controller.playback().output().played[2].1, 3.0);
        controller.stop();
    }

    #[test]
    fn finished_playback_is_reported_through_the_queue() {
        let (transport_mock, _) = transport_expecting_one_session();
        let mut controller = controller(transport_mock, quiet_capture());
        opened(&mut controller);
        controller.handle_event(audio(0.5));
        assert_eq!(controller.playback().outstanding(), 1);

        controller.playback().output().finish(HandleId::new(0));
        assert_eq!(controller.process_pending(), 1);

        assert_eq!(controller.playback().outstanding(), 0);
        controller.stop();
    }

    #[test]
    fn events_from_an_ended_session_are_discarded() {
        let captured = Arc::new(Mutex::new(None::<EventSender>));
        let slot = captured.clone();
        let mut transport_mock = MockSessionTransport::new();
        transport_mock
            .expect_open()
            .times(1)
            .returning(move |_, events| {
                *slot.lock().unwrap() = Some(events);
                Ok(())
            });
        transport_mock
            .expect_frame_sender()
            .returning(|| Some(FrameSender::new(|_| {})));
        transport_mock.expect_close().times(1).return_const(());
        let mut controller = controller(transport_mock, quiet_capture());

        controller.start().unwrap();
        let events = captured.lock().unwrap().clone().unwrap();
        events.transport(TransportEvent::Opened);
        controller.process_pending();
        assert_eq!(controller.state(), SessionState::Active);

        controller.stop();
        events.transport(TransportEvent::UserTranscript("late".to_string()));
        events.transport(TransportEvent::Error("late".to_string()));
        assert_eq!(controller.process_pending(), 2);

        assert!(controller.transcript().conversation().is_empty());
        assert!(controller.error().is_none());
    }

    #[test]
    fn view_tracks_state_and_conversation() {
        let (transport_mock, _) = transport_expecting_one_session();
        let mut controller = controller(transport_mock, quiet_capture());
        let view = controller.subscribe();

        opened(&mut controller);
        controller.handle_event(transport(TransportEvent::AssistantTranscript("Hello".to_string())));
        controller.handle_event(audio(0.5));

        {
            let view = view.borrow();
            assert_eq!(view.state, SessionState::Active);
            assert_eq!(view.conversation[1].text(), "Hello");
            assert_eq!(view.playing, 1);
        }

        controller.stop();
        assert_eq!(view.borrow().state, SessionState::Idle);
        assert_eq!(view.borrow().playing, 0);
    }

    #[test]
    fn invalid_transitions_are_rejected() {
        assert!(SessionState::Idle.can_enter(SessionState::Connecting));
        assert!(!SessionState::Idle.can_enter(SessionState::Active));
        assert!(!SessionState::Idle.can_enter(SessionState::Closing));
        assert!(!SessionState::Active.can_enter(SessionState::Connecting));
        assert!(SessionState::Closing.can_enter(SessionState::Idle));
    }

    #[tokio::test]
    async fn run_loop_follows_handle_commands() {
        let (transport_mock, _) = transport_expecting_one_session();
        let mut capture = MockAudioCaptureSource::new();
        capture.expect_start().times(0);
        capture.expect_stop().times(1).return_const(());
        let controller = controller(transport_mock, capture);
        let (handle, commands) = controller.handle(4);
        let mut view = handle.subscribe();

        let driver = async move {
            handle.start().await.unwrap();
            view.wait_for(|v| v.state == SessionState::Connecting)
                .await
                .unwrap();
            handle.stop().await.unwrap();
            view.wait_for(|v| v.state == SessionState::Idle).await.unwrap();
            assert!(handle.view().error.is_none());
        };

        tokio::join!(controller.run(commands), driver);
    }
}
