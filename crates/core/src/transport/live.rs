use std::sync::{Arc, Mutex};

use gemini_live::types::{Blob, ClientMessage, ServerMessage, SetupConfigurator};
use gemini_live::{ClientTx, Config, ServerEvent, ServerRx};
use tokio::sync::broadcast::error::RecvError;

use super::{EncodedFrame, FrameSender, LiveSessionConfig, SessionTransport, TransportEvent};
use crate::error::TransportError;
use crate::events::EventSender;

type SenderSlot = Arc<Mutex<Option<ClientTx>>>;

const CHANNEL_CAPACITY: usize = 256;

/// [`SessionTransport`] over the Gemini Live websocket client.
///
/// The connection is driven by a spawned task that owns the client; the
/// outbound queue is shared with capture through a slot that `close` empties.
pub struct LiveTransport {
    base_url: Option<String>,
    api_key: String,
    slot: SenderSlot,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl LiveTransport {
    pub fn new(api_key: &str) -> Self {
        Self {
            base_url: None,
            api_key: api_key.to_string(),
            slot: Arc::new(Mutex::new(None)),
            task: None,
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = Some(base_url.to_string());
        self
    }

    fn client_config(&self, model: &str) -> Config {
        let mut builder = Config::builder().with_api_key(&self.api_key).with_model(model);
        if let Some(ref base_url) = self.base_url {
            builder = builder.with_base_url(base_url);
        }
        builder.build()
    }
}

impl SessionTransport for LiveTransport {
    fn open(
        &mut self,
        config: &LiveSessionConfig,
        events: EventSender,
    ) -> Result<(), TransportError> {
        if self.task.is_some() {
            return Err(TransportError::AlreadyOpen);
        }

        let mut setup = SetupConfigurator::new(config.model());
        if let Some(instructions) = config.instructions() {
            setup = setup.with_instructions(instructions);
        }
        if let Some(voice) = config.voice() {
            setup = setup.with_voice(voice.clone());
        }
        let setup = setup.build();
        let client_config = self.client_config(config.model());
        let slot = self.slot.clone();

        self.task = Some(tokio::spawn(async move {
            let connected = gemini_live::connect_with_config(CHANNEL_CAPACITY, client_config).await;
            let mut client = match connected {
                Ok(client) => client,
                Err(e) => {
                    tracing::error!("failed to connect live session: {:#}", e);
                    events.transport(TransportEvent::Error(format!("{:#}", e)));
                    return;
                }
            };
            let server_rx = match client.server_events() {
                Ok(rx) => rx,
                Err(e) => {
                    events.transport(TransportEvent::Error(e.to_string()));
                    return;
                }
            };
            if let Err(e) = client.send_setup(setup).await {
                events.transport(TransportEvent::Error(format!("{:#}", e)));
                return;
            }
            tracing::debug!("setup sent, waiting for setupComplete");

            let sender = client.sender();
            pump(server_rx, &events, || {
                if let Ok(mut guard) = slot.lock() {
                    *guard = sender.clone();
                }
            })
            .await;

            if let Ok(mut guard) = slot.lock() {
                *guard = None;
            }
            if let Ok(stats) = client.stats() {
                tracing::info!(
                    "live session ended: frames_sent={}, bytes_sent={}, audio_chunks_received={}",
                    stats.frames_sent(),
                    stats.bytes_sent(),
                    stats.audio_chunks_received()
                );
            }
        }));
        Ok(())
    }

    fn frame_sender(&self) -> Option<FrameSender> {
        let ready = self
            .slot
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false);
        if !ready {
            return None;
        }
        let slot = self.slot.clone();
        Some(FrameSender::new(move |frame: EncodedFrame| {
            let Ok(guard) = slot.lock() else {
                return;
            };
            let Some(ref tx) = *guard else {
                return;
            };
            let blob = Blob::new(frame.data().to_string(), &frame.mime_type());
            if let Err(e) = tx.try_send(ClientMessage::media_chunk(blob)) {
                tracing::trace!("dropping audio frame: {}", e);
            }
        }))
    }

    fn close(&mut self) {
        if let Ok(mut guard) = self.slot.lock() {
            *guard = None;
        }
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!("live transport closed");
        }
    }
}

impl Drop for LiveTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Splits one server message into transport events.
///
/// Transcripts come before audio, and turn completion comes last so text
/// carried by the same message lands in the turn it completes.
pub fn translate(message: &ServerMessage) -> Vec<TransportEvent> {
    let mut out = Vec::new();
    let Some(content) = message.server_content() else {
        return out;
    };
    if let Some(text) = content.input_transcription() {
        out.push(TransportEvent::UserTranscript(text.to_string()));
    }
    if let Some(text) = content.output_transcription() {
        out.push(TransportEvent::AssistantTranscript(text.to_string()));
    }
    for blob in content.audio_chunks() {
        out.push(TransportEvent::Audio(blob.data().to_string()));
    }
    if content.is_interrupted() {
        out.push(TransportEvent::Interrupted);
    }
    if content.is_turn_complete() {
        out.push(TransportEvent::TurnComplete);
    }
    out
}

/// Forwards server events until the connection ends. `on_ready` runs once,
/// before `Opened` is posted.
async fn pump(mut server_rx: ServerRx, events: &EventSender, mut on_ready: impl FnMut()) {
    let mut opened = false;
    loop {
        match server_rx.recv().await {
            Ok(ServerEvent::Message(message)) => {
                if message.is_setup_complete() && !opened {
                    opened = true;
                    on_ready();
                    events.transport(TransportEvent::Opened);
                }
                for event in translate(&message) {
                    events.transport(event);
                }
            }
            Ok(ServerEvent::Closed { reason }) => {
                tracing::info!("live session closed by server: {:?}", reason);
                events.transport(TransportEvent::Closed { reason });
                break;
            }
            Ok(ServerEvent::Error(e)) => {
                tracing::error!("live session failed: {}", e);
                events.transport(TransportEvent::Error(e));
                break;
            }
            Err(RecvError::Lagged(n)) => {
                tracing::warn!("live event stream lagged by {} messages", n);
            }
            Err(RecvError::Closed) => {
                events.transport(TransportEvent::Closed { reason: None });
                break;
            }
        }
    }
}
