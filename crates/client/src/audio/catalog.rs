//! Track catalogue: per-key playback parameters, loaded from JSON.
//!
//! ```json
//! {
//!   "NIGHT": { "volume": 0.8, "looping": true },
//!   "ding": { "category": "effect", "duration_ms": 600 }
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use partyline_domain::AudioCategory;

use super::output::AudioError;

fn default_volume() -> f32 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSpec {
    /// Informational; the category a track plays in is chosen by the caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<AudioCategory>,
    /// Target volume once faded in.
    #[serde(default = "default_volume")]
    pub volume: f32,
    /// Defaults to looping for music only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub looping: Option<bool>,
    /// Overrides the category's default fade.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fade_ms: Option<u64>,
    /// Natural length; unset plays until stopped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl Default for TrackSpec {
    fn default() -> Self {
        Self {
            category: None,
            volume: default_volume(),
            looping: None,
            fade_ms: None,
            duration_ms: None,
        }
    }
}

impl TrackSpec {
    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = Some(looping);
        self
    }

    pub fn with_fade(mut self, fade: Duration) -> Self {
        self.fade_ms = Some(fade.as_millis() as u64);
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = Some(duration.as_millis() as u64);
        self
    }

    pub fn is_looping(&self, category: AudioCategory) -> bool {
        self.looping.unwrap_or(category == AudioCategory::Music)
    }

    pub fn fade(&self) -> Option<Duration> {
        self.fade_ms.map(Duration::from_millis)
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackCatalog {
    tracks: HashMap<String, TrackSpec>,
}

impl TrackCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks the bundled lobby and poll games use, for running without a
    /// catalogue file.
    pub fn demo() -> Self {
        let tagged = |category| TrackSpec {
            category: Some(category),
            ..TrackSpec::default()
        };
        Self::new()
            .with_track("lobby", tagged(AudioCategory::Music).with_volume(0.8))
            .with_track(
                "vote",
                tagged(AudioCategory::Effect).with_duration(Duration::from_millis(300)),
            )
            .with_track(
                "tada",
                tagged(AudioCategory::Effect).with_duration(Duration::from_millis(1200)),
            )
            .with_track(
                "results",
                tagged(AudioCategory::Narrator).with_duration(Duration::from_secs(4)),
            )
    }

    pub fn from_json(json: &str) -> Result<Self, AudioError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, AudioError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn with_track(mut self, key: impl Into<String>, spec: TrackSpec) -> Self {
        self.insert(key, spec);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, spec: TrackSpec) {
        self.tracks.insert(key.into(), spec);
    }

    pub fn get(&self, key: &str) -> Option<&TrackSpec> {
        self.tracks.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.tracks.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}
