//! Validated name newtypes
//!
//! These newtypes ensure that names are valid by construction:
//! - Non-empty
//! - Within length limits
//! - Trimmed of leading/trailing whitespace

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DomainError;

/// Maximum length for a player's display name
const MAX_PLAYER_NAME_LENGTH: usize = 32;

/// Maximum length for a game module key
const MAX_GAME_NAME_LENGTH: usize = 64;

// ============================================================================
// PlayerName
// ============================================================================

/// A validated display name (non-empty, <=32 chars, trimmed)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PlayerName(String);

impl PlayerName {
    /// Create a new validated player name.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Invalid` if:
    /// - The name is empty after trimming
    /// - The name exceeds 32 characters after trimming
    pub fn new(name: impl Into<String>) -> Result<Self, DomainError> {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(DomainError::invalid("Player name cannot be empty"));
        }
        if trimmed.chars().count() > MAX_PLAYER_NAME_LENGTH {
            return Err(DomainError::invalid(format!(
                "Player name cannot exceed {} characters",
                MAX_PLAYER_NAME_LENGTH
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for PlayerName {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<PlayerName> for String {
    fn from(name: PlayerName) -> String {
        name.0
    }
}

// ============================================================================
// GameName
// ============================================================================

/// Key of a game module ("poll", "lobby", ...).
///
/// Lowercased and trimmed; only ASCII letters, digits, `-` and `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GameName(String);

impl GameName {
    pub fn new(name: impl Into<String>) -> Result<Self, DomainError> {
        let name = name.into();
        let normalized = name.trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return Err(DomainError::invalid("Game name cannot be empty"));
        }
        if normalized.len() > MAX_GAME_NAME_LENGTH {
            return Err(DomainError::invalid(format!(
                "Game name cannot exceed {} characters",
                MAX_GAME_NAME_LENGTH
            )));
        }
        if !normalized
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(DomainError::invalid(format!(
                "Game name '{}' contains invalid characters",
                normalized
            )));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GameName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for GameName {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<GameName> for String {
    fn from(name: GameName) -> String {
        name.0
    }
}

impl std::str::FromStr for GameName {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_name_is_trimmed() {
        let name = PlayerName::new("  Ada  ").unwrap();
        assert_eq!(name.as_str(), "Ada");
    }

    #[test]
    fn player_name_rejects_blank_and_long_input() {
        assert!(PlayerName::new("   ").is_err());
        assert!(PlayerName::new("x".repeat(33)).is_err());
        assert!(PlayerName::new("x".repeat(32)).is_ok());
    }

    #[test]
    fn game_name_is_normalized() {
        let name: GameName = " Poll ".parse().unwrap();
        assert_eq!(name.as_str(), "poll");
    }

    #[test]
    fn game_name_rejects_paths() {
        assert!(GameName::new("../poll").is_err());
        assert!(GameName::new("quiz night").is_err());
    }

    #[test]
    fn names_deserialize_through_validation() {
        let ok: PlayerName = serde_json::from_str("\"Grace\"").unwrap();
        assert_eq!(ok.as_str(), "Grace");
        assert!(serde_json::from_str::<PlayerName>("\"\"").is_err());
    }
}
