//! Partyline domain model.
//!
//! Pure data and state transitions shared by the relay, the host and the
//! players: identifiers, validated value objects, the `Player` entity and the
//! host-owned `Room` aggregate. No I/O lives here.

pub mod aggregates;
pub mod audio;
pub mod entities;
pub mod error;
pub mod ids;
pub mod role;
pub mod value_objects;

pub use aggregates::{JoinOutcome, Room};
pub use audio::AudioCategory;
pub use entities::{Player, PlayerProfile};
pub use error::DomainError;
pub use ids::{ConnectionId, RequestId};
pub use role::Role;
pub use value_objects::{GameName, PlayerName, RoomCode, ROOM_CODE_LEN};
