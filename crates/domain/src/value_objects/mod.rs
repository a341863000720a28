//! Value objects - validated, immutable building blocks.

mod names;
mod room_code;

pub use names::{GameName, PlayerName};
pub use room_code::{RoomCode, ROOM_CODE_LEN};
