//! Aggregate roots - domain objects that own their related data
//!
//! Mutations return outcome enums instead of publishing events; the owner
//! decides what to broadcast.

pub mod room;

pub use room::{JoinOutcome, Room};
