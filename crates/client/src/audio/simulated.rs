//! Audio backend that plays the track catalogue in (tokio) virtual time.
//!
//! Nothing is audible: playback is a timer plus a volume cell, which makes it
//! the backend for headless hosts and for tests.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::catalog::TrackCatalog;
use super::output::{AudioError, AudioOutput, PlaybackHandle};

/// A simulated playing sound.
pub struct SimulatedPlayback {
    id: u64,
    key: String,
    looping: bool,
    volume: AtomicU32,
    stopped: AtomicBool,
    ends_at: Option<Instant>,
    stop: CancellationToken,
}

impl SimulatedPlayback {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn looping(&self) -> bool {
        self.looping
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::SeqCst))
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Whether the sound is still audible-in-principle: neither stopped nor
    /// run out.
    pub fn is_playing(&self) -> bool {
        !self.is_stopped() && self.ends_at.map_or(true, |end| Instant::now() < end)
    }
}

#[async_trait]
impl PlaybackHandle for SimulatedPlayback {
    fn set_volume(&self, volume: f32) {
        self.volume
            .store(volume.clamp(0.0, 1.0).to_bits(), Ordering::SeqCst);
    }

    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            tracing::trace!(key = %self.key, id = self.id, "Simulated playback stopped");
        }
        self.stop.cancel();
    }

    async fn finished(&self) {
        match self.ends_at {
            Some(end) => {
                tokio::select! {
                    _ = tokio::time::sleep_until(end) => {}
                    _ = self.stop.cancelled() => {}
                }
            }
            None => self.stop.cancelled().await,
        }
    }
}

/// [`AudioOutput`] backed by a [`TrackCatalog`].
///
/// Keys missing from the catalogue fail with `AudioError::UnknownTrack`.
pub struct SimulatedOutput {
    catalog: TrackCatalog,
    next_id: AtomicU64,
    opened: Mutex<Vec<String>>,
    playbacks: DashMap<u64, Arc<SimulatedPlayback>>,
}

impl SimulatedOutput {
    pub fn new(catalog: TrackCatalog) -> Self {
        Self {
            catalog,
            next_id: AtomicU64::new(1),
            opened: Mutex::new(Vec::new()),
            playbacks: DashMap::new(),
        }
    }

    /// Every key opened so far, in order.
    pub fn opened(&self) -> Vec<String> {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Playbacks that are still running.
    pub fn playing(&self) -> Vec<Arc<SimulatedPlayback>> {
        let mut playing: Vec<_> = self
            .playbacks
            .iter()
            .filter(|entry| entry.value().is_playing())
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        playing.sort_by_key(|p| p.id());
        playing
    }

    /// Most recently opened playback for `key`.
    pub fn latest(&self, key: &str) -> Option<Arc<SimulatedPlayback>> {
        self.playbacks
            .iter()
            .filter(|entry| entry.value().key() == key)
            .max_by_key(|entry| *entry.key())
            .map(|entry| Arc::clone(entry.value()))
    }
}

impl AudioOutput for SimulatedOutput {
    fn open(&self, key: &str, looping: bool) -> Result<Arc<dyn PlaybackHandle>, AudioError> {
        let spec = self
            .catalog
            .get(key)
            .ok_or_else(|| AudioError::UnknownTrack(key.to_string()))?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let ends_at = if looping {
            None
        } else {
            spec.duration().map(|d| Instant::now() + d)
        };
        let playback = Arc::new(SimulatedPlayback {
            id,
            key: key.to_string(),
            looping,
            volume: AtomicU32::new(0f32.to_bits()),
            stopped: AtomicBool::new(false),
            ends_at,
            stop: CancellationToken::new(),
        });

        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(key.to_string());
        self.playbacks.insert(id, Arc::clone(&playback));

        tracing::debug!(key, id, looping, "Simulated playback opened");
        Ok(playback as Arc<dyn PlaybackHandle>)
    }
}
