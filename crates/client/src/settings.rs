//! Client configuration read from the environment.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use partyline_domain::{AudioCategory, PlayerName, RoomCode};

const DEFAULT_RELAY_URL: &str = "ws://127.0.0.1:3456/ws";
const DEFAULT_PLAYER_NAME: &str = "Player";

/// Default fade lengths and ducking applied by the Audio Sequencer.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSettings {
    pub music_fade: Duration,
    pub effect_fade: Duration,
    pub narrator_fade: Duration,
    /// Multiplier applied to music while a ducking narrator cue is live.
    pub duck_factor: f32,
    /// Granularity of fade steps.
    pub fade_step: Duration,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            music_fade: Duration::from_millis(1000),
            effect_fade: Duration::ZERO,
            narrator_fade: Duration::ZERO,
            duck_factor: 0.3,
            fade_step: Duration::from_millis(25),
        }
    }
}

impl AudioSettings {
    pub fn fade_for(&self, category: AudioCategory) -> Duration {
        match category {
            AudioCategory::Music => self.music_fade,
            AudioCategory::Effect => self.effect_fade,
            AudioCategory::Narrator => self.narrator_fade,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub relay_url: Url,
    /// Room to join (players) or reclaim (host).
    pub room: Option<RoomCode>,
    pub name: PlayerName,
    pub avatar: Option<String>,
    /// JSON track catalogue for the simulated audio backend.
    pub tracks_path: Option<PathBuf>,
    pub heartbeat: Duration,
    pub audio: AudioSettings,
}

impl ClientSettings {
    /// Read the `PARTYLINE_*` variables.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        let raw_url = lookup("PARTYLINE_RELAY_URL").unwrap_or_else(|| DEFAULT_RELAY_URL.into());
        let relay_url = parse_relay_url(&raw_url)?;

        let room = lookup("PARTYLINE_ROOM")
            .filter(|s| !s.trim().is_empty())
            .map(|raw| RoomCode::new(&raw).map_err(|_| SettingsError::InvalidRoom(raw)))
            .transpose()?;

        let raw_name = lookup("PARTYLINE_NAME").unwrap_or_else(|| DEFAULT_PLAYER_NAME.into());
        let name = PlayerName::new(raw_name.clone()).map_err(|_| SettingsError::InvalidName(raw_name))?;

        let avatar = lookup("PARTYLINE_AVATAR").filter(|s| !s.trim().is_empty());
        let tracks_path = lookup("PARTYLINE_TRACKS")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        let mut audio = AudioSettings::default();
        if let Some(raw) = lookup("PARTYLINE_MUSIC_FADE_MS") {
            let ms: u64 = parse_number("PARTYLINE_MUSIC_FADE_MS", &raw)?;
            audio.music_fade = Duration::from_millis(ms);
        }
        if let Some(raw) = lookup("PARTYLINE_DUCK_FACTOR") {
            let factor: f32 = parse_number("PARTYLINE_DUCK_FACTOR", &raw)?;
            if !(0.0..=1.0).contains(&factor) {
                return Err(SettingsError::InvalidNumber {
                    key: "PARTYLINE_DUCK_FACTOR",
                    value: raw,
                });
            }
            audio.duck_factor = factor;
        }

        Ok(Self {
            relay_url,
            room,
            name,
            avatar,
            tracks_path,
            heartbeat: Duration::from_secs(15),
            audio,
        })
    }
}

fn parse_relay_url(raw: &str) -> Result<Url, SettingsError> {
    let url = Url::parse(raw.trim()).map_err(|e| SettingsError::InvalidUrl {
        value: raw.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(SettingsError::InvalidUrl {
            value: raw.to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, SettingsError> {
    raw.trim().parse().map_err(|_| SettingsError::InvalidNumber {
        key,
        value: raw.to_string(),
    })
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Invalid relay URL '{value}': {reason}")]
    InvalidUrl { value: String, reason: String },
    #[error("Invalid room code: {0}")]
    InvalidRoom(String),
    #[error("Invalid player name: {0}")]
    InvalidName(String),
    #[error("Invalid value for {key}: {value}")]
    InvalidNumber { key: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_point_at_local_relay() {
        let settings = ClientSettings::from_lookup(lookup(&[])).expect("settings");
        assert_eq!(settings.relay_url.as_str(), DEFAULT_RELAY_URL);
        assert!(settings.room.is_none());
        assert_eq!(settings.name.as_str(), "Player");
        assert_eq!(settings.audio, AudioSettings::default());
    }

    #[test]
    fn reads_room_and_audio_overrides() {
        let settings = ClientSettings::from_lookup(lookup(&[
            ("PARTYLINE_ROOM", "wxyz"),
            ("PARTYLINE_NAME", "Ada"),
            ("PARTYLINE_MUSIC_FADE_MS", "250"),
            ("PARTYLINE_DUCK_FACTOR", "0.5"),
        ]))
        .expect("settings");
        assert_eq!(settings.room.expect("room").as_str(), "WXYZ");
        assert_eq!(settings.name.as_str(), "Ada");
        assert_eq!(settings.audio.music_fade, Duration::from_millis(250));
        assert_eq!(settings.audio.duck_factor, 0.5);
    }

    #[test]
    fn rejects_http_urls_and_bad_numbers() {
        assert!(matches!(
            ClientSettings::from_lookup(lookup(&[("PARTYLINE_RELAY_URL", "http://x/ws")])),
            Err(SettingsError::InvalidUrl { .. })
        ));
        assert!(matches!(
            ClientSettings::from_lookup(lookup(&[("PARTYLINE_DUCK_FACTOR", "2")])),
            Err(SettingsError::InvalidNumber { .. })
        ));
        assert!(matches!(
            ClientSettings::from_lookup(lookup(&[("PARTYLINE_ROOM", "toolong")])),
            Err(SettingsError::InvalidRoom(_))
        ));
    }
}
