//! Entities - identity-bearing domain objects.

mod player;

pub use player::{Player, PlayerProfile};
