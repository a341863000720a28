//! Frames exchanged with the relay server.
//!
//! The relay only understands room membership and addressing. Game messages
//! ride inside `Send`/`Message` as opaque JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use partyline_domain::{ConnectionId, Role, RoomCode};

use crate::messages::{GameMessage, MessageError};

/// Who a `Send` frame is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Target {
    Host,
    /// Every player in the room.
    Players,
    /// Every player except one ("others").
    PlayersExcept(ConnectionId),
    Connection(ConnectionId),
}

// =============================================================================
// Client -> relay
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Open a room as its host. A known `code` reclaims that room after a
    /// reconnect, or creates it if it is gone.
    CreateRoom {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<RoomCode>,
    },
    JoinRoom {
        room: RoomCode,
        role: Role,
    },
    Send {
        to: Target,
        message: Value,
    },
    LeaveRoom,
    Heartbeat,
}

impl ClientFrame {
    /// Wrap a game message for forwarding.
    pub fn send(to: Target, message: &GameMessage) -> Result<Self, MessageError> {
        Ok(ClientFrame::Send {
            to,
            message: message.to_value()?,
        })
    }
}

// =============================================================================
// Relay -> client
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub connection_id: ConnectionId,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayFrame {
    /// Sent to the joining connection only.
    RoomJoined {
        room: RoomCode,
        connection_id: ConnectionId,
        role: Role,
        /// Everyone already in the room, in arrival order.
        peers: Vec<PeerInfo>,
    },
    /// Someone else entered the room.
    Connect {
        connection_id: ConnectionId,
        role: Role,
    },
    Disconnect {
        connection_id: ConnectionId,
    },
    Message {
        from: ConnectionId,
        message: Value,
    },
    Error {
        code: ErrorCode,
        message: String,
    },
    Pong,
}

impl RelayFrame {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        RelayFrame::Error {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ParseError,
    RoomNotFound,
    HostAlreadyConnected,
    AlreadyInRoom,
    NotInRoom,
    /// Players may only address the host.
    Forbidden,
    UnknownTarget,
    RoomCodesExhausted,
}

#[cfg(test)]
mod serde_tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn join_room_wire_format() {
        let frame: ClientFrame =
            serde_json::from_value(json!({"type": "join_room", "room": "wxyz", "role": "player"}))
                .expect("decode");
        assert_eq!(
            frame,
            ClientFrame::JoinRoom {
                room: RoomCode::new("WXYZ").expect("code"),
                role: Role::Player,
            }
        );
    }

    #[test]
    fn create_room_code_is_optional() {
        let frame: ClientFrame =
            serde_json::from_value(json!({"type": "create_room"})).expect("decode");
        assert_eq!(frame, ClientFrame::CreateRoom { code: None });
    }

    #[test]
    fn targets_are_adjacently_tagged() {
        let id = ConnectionId::new();
        assert_eq!(serde_json::to_value(Target::Host).expect("ser"), json!({"kind": "host"}));
        assert_eq!(
            serde_json::to_value(Target::PlayersExcept(id)).expect("ser"),
            json!({"kind": "players_except", "id": id.to_string()})
        );
    }

    #[test]
    fn error_codes_are_screaming_snake() {
        let frame = RelayFrame::error(ErrorCode::HostAlreadyConnected, "taken");
        assert_eq!(
            serde_json::to_value(frame).expect("ser"),
            json!({"type": "error", "code": "HOST_ALREADY_CONNECTED", "message": "taken"})
        );
    }

    #[test]
    fn send_wraps_game_message() {
        let id = ConnectionId::new();
        let frame = ClientFrame::send(Target::Players, &GameMessage::PlayerDisconnect(id))
            .expect("wrap");
        match frame {
            ClientFrame::Send { to, message } => {
                assert_eq!(to, Target::Players);
                assert_eq!(message["event"], "playerdisconnect");
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }
}
