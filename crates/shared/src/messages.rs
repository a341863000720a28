//! Game message catalogue exchanged between host and players.
//!
//! Every message travels as `{"event": <name>, "data": <payload>}` inside a
//! relay `Send`/`Message` frame.
//!
//! ## Versioning Policy
//!
//! - New events can be added at the end (forward compatible)
//! - Renaming an event is a breaking change
//! - Unknown events fail to decode; receivers log and drop them

use serde::{Deserialize, Serialize};
use serde_json::Value;

use partyline_domain::{AudioCategory, ConnectionId, GameName, Player, PlayerProfile, RequestId};

/// Request `type` values every player must understand.
pub mod request_types {
    pub const MESSAGE: &str = "message";
    pub const INSTRUCTIONS: &str = "instructions";
    pub const TIMED_MESSAGE: &str = "timedmessage";
    pub const BUTTON_SELECT: &str = "buttonselect";
}

// =============================================================================
// Envelope
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum GameMessage {
    /// Full ordered player list, sent to a newly connected client.
    #[serde(rename = "playersinroom")]
    PlayersInRoom(Vec<Player>),
    /// One player joined or changed.
    #[serde(rename = "addplayer")]
    AddPlayer(Player),
    #[serde(rename = "playerdisconnect")]
    PlayerDisconnect(ConnectionId),
    #[serde(rename = "server:loadgame")]
    LoadGame(GameName),
    /// Host operator asks for a game. Never crosses the relay.
    #[serde(rename = "host:requestgame")]
    RequestGame(GameName),
    #[serde(rename = "server:request")]
    Request(Request),
    #[serde(rename = "client:response")]
    Response(Response),
    #[serde(rename = "client:join")]
    Join(PlayerProfile),
    #[serde(rename = "audioplay")]
    AudioPlay(AudioCue),
}

impl GameMessage {
    /// Wire name of the event.
    pub fn event_name(&self) -> &'static str {
        match self {
            GameMessage::PlayersInRoom(_) => "playersinroom",
            GameMessage::AddPlayer(_) => "addplayer",
            GameMessage::PlayerDisconnect(_) => "playerdisconnect",
            GameMessage::LoadGame(_) => "server:loadgame",
            GameMessage::RequestGame(_) => "host:requestgame",
            GameMessage::Request(_) => "server:request",
            GameMessage::Response(_) => "client:response",
            GameMessage::Join(_) => "client:join",
            GameMessage::AudioPlay(_) => "audioplay",
        }
    }

    /// Decode a message forwarded by the relay as raw JSON.
    pub fn from_value(value: Value) -> Result<Self, MessageError> {
        let event = value
            .get("event")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(MessageError::MissingEvent)?;
        serde_json::from_value(value).map_err(|source| MessageError::Malformed { event, source })
    }

    pub fn to_value(&self) -> Result<Value, MessageError> {
        serde_json::to_value(self).map_err(|source| MessageError::Malformed {
            event: self.event_name().to_string(),
            source,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("Message has no event name")]
    MissingEvent,

    #[error("Malformed '{event}' message: {source}")]
    Malformed {
        event: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Request of type '{0}' has an unexpected payload")]
    UnexpectedPayload(String),
}

// =============================================================================
// Requests and responses
// =============================================================================

/// A prompt from the host to one or all players.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
    /// Seconds until a `timedmessage` clears itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer: Option<u32>,
}

impl Request {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            id: RequestId::new(),
            kind: kind.into(),
            payload,
            timer: None,
        }
    }

    pub fn message(payload: impl Into<Value>) -> Self {
        Self::new(request_types::MESSAGE, payload.into())
    }

    pub fn instructions(payload: impl Into<Value>) -> Self {
        Self::new(request_types::INSTRUCTIONS, payload.into())
    }

    pub fn timed_message(payload: impl Into<Value>, seconds: u32) -> Self {
        Self {
            timer: Some(seconds),
            ..Self::new(request_types::TIMED_MESSAGE, payload.into())
        }
    }

    pub fn button_select(payload: ButtonSelectPayload) -> Self {
        // ButtonSelectPayload holds only strings; serializing cannot fail.
        let payload = serde_json::to_value(payload).unwrap_or(Value::Null);
        Self::new(request_types::BUTTON_SELECT, payload)
    }

    /// Whether this request expects a `client:response`.
    pub fn expects_response(&self) -> bool {
        self.kind == request_types::BUTTON_SELECT
    }

    /// Decode the payload of a `buttonselect` request.
    pub fn button_select_payload(&self) -> Result<ButtonSelectPayload, MessageError> {
        if self.kind != request_types::BUTTON_SELECT {
            return Err(MessageError::UnexpectedPayload(self.kind.clone()));
        }
        serde_json::from_value(self.payload.clone())
            .map_err(|_| MessageError::UnexpectedPayload(self.kind.clone()))
    }
}

/// A player's answer to a `Request`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub request_id: RequestId,
    pub value: Value,
}

/// One choice of a `buttonselect`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonOption {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl ButtonOption {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: None,
            value: None,
        }
    }

    pub fn labeled(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::new(id)
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// The token carried by the Response when this option is picked.
    pub fn token(&self) -> &str {
        self.value.as_deref().unwrap_or(&self.id)
    }

    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ButtonSelectPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    pub options: Vec<ButtonOption>,
}

impl ButtonSelectPayload {
    pub fn new(options: Vec<ButtonOption>) -> Self {
        Self {
            prompt: None,
            options,
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }
}

// =============================================================================
// Audio
// =============================================================================

/// Ask an Audio Sequencer to play a track in a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioCue {
    #[serde(rename = "type")]
    pub category: AudioCategory,
    pub track: String,
    /// Narrator only: lower the music while this cue is live.
    #[serde(default)]
    pub duck: bool,
}

impl AudioCue {
    pub fn new(category: AudioCategory, track: impl Into<String>) -> Self {
        Self {
            category,
            track: track.into(),
            duck: false,
        }
    }

    pub fn ducking(mut self) -> Self {
        self.duck = true;
        self
    }
}
