use super::test_support::*;
use super::*;

// Common imports used across submodules.
use std::time::Duration;

use partyline_domain::{Role, RoomCode};
use partyline_shared::Target;
use serde_json::json;

mod forwarding;
mod rooms;
