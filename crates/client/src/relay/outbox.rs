use tokio::sync::mpsc;

use partyline_shared::{ClientFrame, GameMessage, Target};

/// Cloneable sender of relay frames.
///
/// Frames queued while the transport is down are dropped on reconnect; the
/// session re-announces itself and the host resends a snapshot.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<ClientFrame>,
}

impl Outbox {
    pub fn new(tx: mpsc::UnboundedSender<ClientFrame>) -> Self {
        Self { tx }
    }

    /// Create an outbox together with the receiving end the transport drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ClientFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn frame(&self, frame: ClientFrame) -> bool {
        if self.tx.send(frame).is_err() {
            tracing::debug!("Relay transport gone, frame dropped");
            return false;
        }
        true
    }

    /// Address a game message.
    pub fn send(&self, to: Target, message: &GameMessage) -> bool {
        match ClientFrame::send(to, message) {
            Ok(frame) => self.frame(frame),
            Err(e) => {
                tracing::error!(event = message.event_name(), error = %e, "Failed to encode message");
                false
            }
        }
    }

    pub fn to_host(&self, message: &GameMessage) -> bool {
        self.send(Target::Host, message)
    }

    pub fn to_players(&self, message: &GameMessage) -> bool {
        self.send(Target::Players, message)
    }
}
