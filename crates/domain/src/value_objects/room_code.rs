//! Human-typeable room codes.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DomainError;

/// Number of letters in a room code.
pub const ROOM_CODE_LEN: usize = 4;

/// Letters used when generating codes. `I` and `O` are left out because they
/// are easily confused with digits on a shared screen.
const GENERATION_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";

/// A room code such as `WXYZ`.
///
/// Input is accepted case-insensitively and stored uppercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode(String);

impl RoomCode {
    /// Parse a code typed by a person.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Invalid` unless the trimmed input is exactly
    /// four ASCII letters.
    pub fn new(code: impl AsRef<str>) -> Result<Self, DomainError> {
        let normalized = code.as_ref().trim().to_ascii_uppercase();
        if normalized.len() != ROOM_CODE_LEN
            || !normalized.chars().all(|c| c.is_ascii_uppercase())
        {
            return Err(DomainError::invalid(format!(
                "Room code must be {} letters, got '{}'",
                ROOM_CODE_LEN,
                code.as_ref()
            )));
        }
        Ok(Self(normalized))
    }

    /// Generate a code from an injected index source.
    ///
    /// `pick(n)` must return a value in `0..n`; out of range values wrap.
    pub fn generate(mut pick: impl FnMut(usize) -> usize) -> Self {
        let code = (0..ROOM_CODE_LEN)
            .map(|_| {
                let idx = pick(GENERATION_ALPHABET.len()) % GENERATION_ALPHABET.len();
                GENERATION_ALPHABET[idx] as char
            })
            .collect();
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for RoomCode {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> String {
        code.0
    }
}

impl std::str::FromStr for RoomCode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_lowercase_input() {
        let code = RoomCode::new(" wxyz ").unwrap();
        assert_eq!(code.as_str(), "WXYZ");
    }

    #[test]
    fn rejects_wrong_length_and_digits() {
        assert!(RoomCode::new("ABC").is_err());
        assert!(RoomCode::new("ABCDE").is_err());
        assert!(RoomCode::new("AB1D").is_err());
    }

    #[test]
    fn generate_skips_ambiguous_letters() {
        let mut calls = 0usize;
        let code = RoomCode::generate(|n| {
            calls += 1;
            n - 1
        });
        assert_eq!(calls, ROOM_CODE_LEN);
        assert_eq!(code.as_str(), "ZZZZ");

        let code = RoomCode::generate(|_| 8);
        assert_eq!(code.as_str(), "JJJJ");
    }

    #[test]
    fn serde_round_trip_validates() {
        let code: RoomCode = serde_json::from_str("\"abcd\"").unwrap();
        assert_eq!(serde_json::to_string(&code).unwrap(), "\"ABCD\"");
        assert!(serde_json::from_str::<RoomCode>("\"AB\"").is_err());
    }
}
