//! Partyline wire contract shared by the relay, the host and the players.
//!
//! Two layers:
//! - [`relay`]: frames exchanged with the relay server (room membership and
//!   addressed forwarding)
//! - [`messages`]: the game message catalogue carried inside relay frames
//!
//! # Design Principles
//!
//! 1. **No business logic** - pure data types and serialization
//! 2. **Domain vocabulary** - ids, room codes and players come from
//!    `partyline-domain` unchanged

pub mod messages;
pub mod relay;

pub use messages::{
    request_types, AudioCue, ButtonOption, ButtonSelectPayload, GameMessage, MessageError,
    Request, Response,
};
pub use relay::{ClientFrame, ErrorCode, PeerInfo, RelayFrame, Target};
