//! Audio vocabulary shared by the wire contract and the sequencer.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DomainError;

/// Mutually exclusive playback slots. Each category owns at most one live
/// track at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCategory {
    Music,
    Effect,
    Narrator,
}

impl AudioCategory {
    pub const ALL: [AudioCategory; 3] = [
        AudioCategory::Music,
        AudioCategory::Effect,
        AudioCategory::Narrator,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AudioCategory::Music => "music",
            AudioCategory::Effect => "effect",
            AudioCategory::Narrator => "narrator",
        }
    }
}

impl fmt::Display for AudioCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AudioCategory {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "music" => Ok(AudioCategory::Music),
            "effect" | "effects" | "sfx" => Ok(AudioCategory::Effect),
            "narrator" | "narration" => Ok(AudioCategory::Narrator),
            other => Err(DomainError::unrecognized(format!(
                "Unknown audio category: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_string(&AudioCategory::Narrator).unwrap();
        assert_eq!(json, "\"narrator\"");
    }

    #[test]
    fn parses_aliases() {
        assert_eq!("SFX".parse::<AudioCategory>().unwrap(), AudioCategory::Effect);
        assert!("voice".parse::<AudioCategory>().is_err());
    }
}
