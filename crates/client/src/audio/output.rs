use std::sync::Arc;

use async_trait::async_trait;

/// Errors raised by audio backends and catalogue loading.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("Unknown track: {0}")]
    UnknownTrack(String),
    #[error("Track {key} cannot be played: {reason}")]
    Unplayable { key: String, reason: String },
    #[error("Failed to read track catalogue: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid track catalogue: {0}")]
    Catalog(#[from] serde_json::Error),
}

/// One playing sound.
#[async_trait]
pub trait PlaybackHandle: Send + Sync {
    /// Absolute output volume, 0.0 to 1.0.
    fn set_volume(&self, volume: f32);

    fn stop(&self);

    /// Resolves when playback ends, naturally or through `stop`.
    async fn finished(&self);
}

/// Port to whatever actually produces sound.
#[cfg_attr(test, mockall::automock)]
pub trait AudioOutput: Send + Sync {
    fn open(&self, key: &str, looping: bool) -> Result<Arc<dyn PlaybackHandle>, AudioError>;
}
