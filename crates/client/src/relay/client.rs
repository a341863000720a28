//! Reconnecting relay client using tokio-tungstenite.
//!
//! Owns the socket. Outbound frames come from an [`Outbox`](super::Outbox)
//! receiver, inbound frames and connection changes go out as [`RelayEvent`]s.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use url::Url;

use partyline_shared::{ClientFrame, RelayFrame};

use super::backoff::{BackoffPolicy, BackoffState};

const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(15);

/// Connection state of the relay transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected to the relay
    Disconnected,
    /// Attempting to establish connection
    Connecting,
    Connected,
    /// Connection lost, waiting before the next attempt
    Reconnecting,
    /// Gave up (bounded backoff policy only)
    Failed,
}

/// What the transport reports to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    /// Socket is open; the owner should (re)join its room.
    Connected,
    Frame(RelayFrame),
    /// Socket closed; a reconnect follows unless shutting down.
    Disconnected,
}

#[derive(Debug, thiserror::Error)]
pub enum RelayClientError {
    #[error("Failed to connect to relay: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("Failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

enum SessionEnd {
    /// Shutdown requested, or nobody listens any more.
    Stop,
    /// Transport dropped; reconnect.
    Lost,
}

/// WebSocket client for the relay (desktop).
pub struct RelayClient {
    url: Url,
    policy: BackoffPolicy,
    heartbeat: Duration,
    state: watch::Sender<ConnectionState>,
}

impl RelayClient {
    pub fn new(url: Url) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            url,
            policy: BackoffPolicy::default(),
            heartbeat: DEFAULT_HEARTBEAT,
            state,
        }
    }

    pub fn with_backoff(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    /// Observe connection state changes.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Run the transport on a background task until `shutdown` fires, the
    /// outbox closes, or the event receiver goes away.
    pub fn spawn(
        self,
        outbound: mpsc::UnboundedReceiver<ClientFrame>,
        events: mpsc::UnboundedSender<RelayEvent>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(outbound, events, shutdown))
    }

    pub async fn run(
        self,
        mut outbound: mpsc::UnboundedReceiver<ClientFrame>,
        events: mpsc::UnboundedSender<RelayEvent>,
        shutdown: CancellationToken,
    ) {
        let mut backoff = BackoffState::new(self.policy);

        loop {
            if shutdown.is_cancelled() {
                break;
            }
            self.state.send_replace(ConnectionState::Connecting);

            match self.connect_and_serve(&mut outbound, &events, &shutdown, &mut backoff).await {
                Ok(SessionEnd::Stop) => break,
                Ok(SessionEnd::Lost) => {
                    tracing::info!(url = %self.url, "Relay connection lost");
                }
                Err(e) => {
                    tracing::warn!(url = %self.url, attempt = backoff.attempts(), error = %e, "Relay connection failed");
                }
            }

            self.state.send_replace(ConnectionState::Reconnecting);
            let Some(delay) = backoff.next_delay_and_advance() else {
                tracing::error!("Max reconnection attempts reached, giving up");
                self.state.send_replace(ConnectionState::Failed);
                return;
            };
            tracing::info!(
                attempt = backoff.attempts(),
                delay_ms = delay.as_millis() as u64,
                "Reconnecting to relay"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.cancelled() => break,
            }
        }

        self.state.send_replace(ConnectionState::Disconnected);
    }

    async fn connect_and_serve(
        &self,
        outbound: &mut mpsc::UnboundedReceiver<ClientFrame>,
        events: &mpsc::UnboundedSender<RelayEvent>,
        shutdown: &CancellationToken,
        backoff: &mut BackoffState,
    ) -> Result<SessionEnd, RelayClientError> {
        let (ws_stream, _) = connect_async(self.url.as_str()).await?;
        tracing::info!(url = %self.url, "Connected to relay");
        backoff.reset();
        self.state.send_replace(ConnectionState::Connected);

        // Anything queued while offline addressed the old session.
        let mut stale = 0usize;
        while outbound.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            tracing::debug!(count = stale, "Dropped frames queued while disconnected");
        }

        if events.send(RelayEvent::Connected).is_err() {
            return Ok(SessionEnd::Stop);
        }

        let (mut write, mut read) = ws_stream.split();
        let mut heartbeat = tokio::time::interval(self.heartbeat);
        heartbeat.tick().await;

        let end = loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    break SessionEnd::Stop;
                }
                frame = outbound.recv() => {
                    let Some(frame) = frame else {
                        let _ = write.send(Message::Close(None)).await;
                        break SessionEnd::Stop;
                    };
                    let json = serde_json::to_string(&frame)?;
                    if let Err(e) = write.send(Message::Text(json)).await {
                        tracing::error!(error = %e, "Failed to send frame");
                        break SessionEnd::Lost;
                    }
                }
                _ = heartbeat.tick() => {
                    let json = serde_json::to_string(&ClientFrame::Heartbeat)?;
                    if write.send(Message::Text(json)).await.is_err() {
                        break SessionEnd::Lost;
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<RelayFrame>(&text) {
                                Ok(RelayFrame::Pong) => {}
                                Ok(frame) => {
                                    if events.send(RelayEvent::Frame(frame)).is_err() {
                                        break SessionEnd::Stop;
                                    }
                                }
                                Err(e) => tracing::warn!(error = %e, "Failed to parse relay frame"),
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::info!("Relay closed connection");
                            break SessionEnd::Lost;
                        }
                        Some(Err(e)) => {
                            tracing::error!(error = %e, "WebSocket error");
                            break SessionEnd::Lost;
                        }
                        Some(Ok(_)) => {}
                    }
                }
            }
        };

        if matches!(end, SessionEnd::Lost) && events.send(RelayEvent::Disconnected).is_err() {
            return Ok(SessionEnd::Stop);
        }
        Ok(end)
    }
}
