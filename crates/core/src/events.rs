use tokio::sync::mpsc;

use crate::playback::HandleId;
use crate::transport::TransportEvent;

/// Everything that reaches the controller from outside its own call stack.
///
/// Components never mutate session state; they post one of these and the
/// controller applies it on its own turn of the event loop.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Transport(TransportEvent),
    PlaybackEnded(HandleId),
    CaptureFailed(String),
}

/// A [`SessionEvent`] stamped with the session it belongs to.
#[derive(Debug)]
pub(crate) struct Envelope {
    pub(crate) epoch: u64,
    pub(crate) event: SessionEvent,
}

/// Posting side handed to components for the lifetime of one session.
///
/// Events posted after that session ended are discarded by the controller.
#[derive(Debug, Clone)]
pub struct EventSender {
    epoch: u64,
    tx: mpsc::UnboundedSender<Envelope>,
}

impl EventSender {
    pub(crate) fn new(epoch: u64, tx: mpsc::UnboundedSender<Envelope>) -> Self {
        Self { epoch, tx }
    }

    /// A sender wired to nothing, for components exercised outside a controller.
    pub fn detached() -> Self {
        let (tx, _) = mpsc::unbounded_channel();
        Self { epoch: 0, tx }
    }

    pub fn post(&self, event: SessionEvent) {
        let envelope = Envelope {
            epoch: self.epoch,
            event,
        };
        if self.tx.send(envelope).is_err() {
            tracing::trace!("controller gone, dropping session event");
        }
    }

    pub fn transport(&self, event: TransportEvent) {
        self.post(SessionEvent::Transport(event));
    }

    pub fn playback_ended(&self, id: HandleId) {
        self.post(SessionEvent::PlaybackEnded(id));
    }

    pub fn capture_failed(&self, message: impl Into<String>) {
        self.post(SessionEvent::CaptureFailed(message.into()));
    }
}
