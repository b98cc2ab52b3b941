use std::sync::{Arc, Mutex};
use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use crate::types;

mod consts;
mod config;
mod utils;
mod stats;

pub use config::{Config, ConfigBuilder};
pub use stats::Stats;

pub type ClientTx = tokio::sync::mpsc::Sender<types::ClientMessage>;
type ServerTx = tokio::sync::broadcast::Sender<ServerEvent>;
pub type ServerRx = tokio::sync::broadcast::Receiver<ServerEvent>;

/// What the receive task publishes to subscribers.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    Message(types::ServerMessage),
    /// The socket closed, either by a close frame or end of stream.
    Closed { reason: Option<String> },
    /// The socket failed; no further events follow.
    Error(String),
}

struct Connection {
    send_handle: tokio::task::JoinHandle<()>,
    recv_handle: tokio::task::JoinHandle<()>,
}

pub struct Client {
    capacity: usize,
    config: Config,
    c_tx: Option<ClientTx>,
    s_tx: Option<ServerTx>,
    connection: Option<Connection>,
    stats: Arc<Mutex<Stats>>,
}

impl Client {
    fn new(capacity: usize, config: Config) -> Self {
        Self {
            capacity,
            config,
            c_tx: None,
            s_tx: None,
            connection: None,
            stats: Arc::new(Mutex::new(Stats::new())),
        }
    }

    async fn connect(&mut self) -> anyhow::Result<()> {
        if self.c_tx.is_some() {
            anyhow::bail!("already connected");
        }

        let request = utils::build_request(&self.config)?;
        let (ws_stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .context("Failed to connect to Live WebSocket")?;
        tracing::info!("Connected to Live WebSocket, model={}", self.config.model());

        let (mut write, mut read) = ws_stream.split();

        let (c_tx, mut c_rx) = tokio::sync::mpsc::channel::<types::ClientMessage>(self.capacity);
        let (s_tx, _) = tokio::sync::broadcast::channel(self.capacity);

        self.c_tx = Some(c_tx);
        self.s_tx = Some(s_tx.clone());

        let stats = self.stats.clone();
        let send_handle = tokio::spawn(async move {
            while let Some(message) = c_rx.recv().await {
                let text = match serde_json::to_string(&message) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!("failed to serialize message: {}", e);
                        continue;
                    }
                };
                let frame_len = match &message {
                    types::ClientMessage::RealtimeInput(input) => input
                        .media_chunks()
                        .iter()
                        .map(|blob| blob.data().len())
                        .sum::<usize>(),
                    _ => 0,
                };
                if let Err(e) = write.send(Message::Text(text)).await {
                    tracing::error!("failed to send message: {}", e);
                    break;
                }
                if frame_len > 0 {
                    if let Ok(mut stats_guard) = stats.lock() {
                        stats_guard.record_frame(frame_len);
                    }
                }
            }
            // Every sender is gone: the session is closing.
            if let Err(e) = write.send(Message::Close(None)).await {
                tracing::debug!("failed to send close frame: {}", e);
            }
        });

        let stats = self.stats.clone();
        let recv_handle = tokio::spawn(async move {
            loop {
                let message = match read.next().await {
                    None => {
                        publish(&s_tx, ServerEvent::Closed { reason: None });
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::error!("failed to read message: {}", e);
                        publish(&s_tx, ServerEvent::Error(e.to_string()));
                        break;
                    }
                    Some(Ok(message)) => message,
                };
                match message {
                    Message::Text(text) => handle_json(&text, &s_tx, &stats),
                    Message::Binary(bin) => match utils::json_payload(&bin) {
                        Some(text) => handle_json(text, &s_tx, &stats),
                        None => tracing::warn!("unexpected binary message of {} bytes", bin.len()),
                    },
                    Message::Close(frame) => {
                        tracing::info!("connection closed: {:?}", frame);
                        let reason = frame.map(|f| f.reason.to_string());
                        publish(&s_tx, ServerEvent::Closed { reason });
                        break;
                    }
                    _ => {}
                }
            }
        });

        self.connection = Some(Connection {
            send_handle,
            recv_handle,
        });
        Ok(())
    }

    pub fn server_events(&self) -> anyhow::Result<ServerRx> {
        match self.s_tx {
            Some(ref tx) => Ok(tx.subscribe()),
            None => Err(anyhow::anyhow!("not connected yet")),
        }
    }

    /// A sender for non-async contexts such as an audio callback.
    pub fn sender(&self) -> Option<ClientTx> {
        self.c_tx.clone()
    }

    pub fn stats(&self) -> anyhow::Result<Stats> {
        self.stats
            .lock()
            .map(|stats_guard| stats_guard.clone())
            .map_err(|_| anyhow::anyhow!("failed to get stats"))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    async fn send_client_message(&mut self, message: types::ClientMessage) -> anyhow::Result<()> {
        match self.c_tx {
            Some(ref tx) => {
                tx.send(message).await.context("send task has stopped")?;
                Ok(())
            }
            None => Err(anyhow::anyhow!("not connected yet")),
        }
    }

    pub async fn send_setup(&mut self, setup: types::Setup) -> anyhow::Result<()> {
        self.send_client_message(types::ClientMessage::setup(setup)).await
    }

    pub async fn send_audio(&mut self, blob: types::Blob) -> anyhow::Result<()> {
        self.send_client_message(types::ClientMessage::media_chunk(blob)).await
    }

    pub async fn send_audio_stream_end(&mut self) -> anyhow::Result<()> {
        self.send_client_message(types::ClientMessage::audio_stream_end()).await
    }

    /// Stops both tasks. Safe to call more than once.
    ///
    /// Dropping the last sender lets the send task flush and write a close
    /// frame; the receive task is aborted so nothing is published afterwards.
    pub fn close(&mut self) {
        self.c_tx = None;
        self.s_tx = None;
        if let Some(connection) = self.connection.take() {
            connection.recv_handle.abort();
            drop(connection.send_handle);
            tracing::debug!("live connection closed by client");
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.close();
    }
}

fn publish(s_tx: &ServerTx, event: ServerEvent) {
    if let Err(e) = s_tx.send(event) {
        tracing::debug!("no subscriber for server event: {:?}", e.0);
    }
}

fn handle_json(text: &str, s_tx: &ServerTx, stats: &Arc<Mutex<Stats>>) {
    match serde_json::from_str::<types::ServerMessage>(text) {
        Ok(message) => {
            let audio_chunks = message
                .server_content()
                .map(|content| content.audio_chunks().count())
                .unwrap_or(0);
            if let Ok(mut stats_guard) = stats.lock() {
                stats_guard.record_audio_chunks(audio_chunks);
                if let Some(usage) = message.usage_metadata() {
                    stats_guard.update_usage(
                        usage.total_token_count(),
                        usage.prompt_token_count(),
                        usage.response_token_count(),
                    );
                }
            }
            if let Some(go_away) = message.go_away() {
                tracing::warn!("server will disconnect soon, time_left={:?}", go_away.time_left());
            }
            publish(s_tx, ServerEvent::Message(message));
        }
        Err(e) => {
            tracing::error!("failed to deserialize message: {}, text=> {:?}", e, text);
        }
    }
}

pub async fn connect_with_config(capacity: usize, config: Config) -> anyhow::Result<Client> {
    let mut client = Client::new(capacity, config);
    client.connect().await?;
    Ok(client)
}

pub async fn connect() -> anyhow::Result<Client> {
    let config = Config::new();
    connect_with_config(1024, config).await
}
