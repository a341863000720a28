use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DomainError;

/// Which side of a room a connection plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The single authoritative display.
    Host,
    Player,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Host => "host",
            Role::Player => "player",
        }
    }

    #[inline]
    pub fn is_host(&self) -> bool {
        matches!(self, Role::Host)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "host" => Ok(Role::Host),
            "player" => Ok(Role::Player),
            other => Err(DomainError::unrecognized(format!("Unknown role: {}", other))),
        }
    }
}
