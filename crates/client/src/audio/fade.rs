//! Volume mixing and fade stepping.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::output::PlaybackHandle;

#[derive(Debug, Clone, Copy)]
struct Levels {
    /// Configured level: track volume x category volume x mute x duck.
    base: f32,
    /// Fade position, 0.0 to 1.0.
    gain: f32,
}

/// Output volume of one track as `base * gain`.
///
/// The actor owns `base`, a fade task owns `gain`; the lock makes each
/// update apply the product of the latest pair.
pub(super) struct Mix {
    handle: Arc<dyn PlaybackHandle>,
    levels: Mutex<Levels>,
}

impl Mix {
    pub(super) fn new(handle: Arc<dyn PlaybackHandle>, base: f32, gain: f32) -> Arc<Self> {
        let mix = Arc::new(Self {
            handle,
            levels: Mutex::new(Levels { base, gain }),
        });
        mix.apply(&mix.lock());
        mix
    }

    fn lock(&self) -> MutexGuard<'_, Levels> {
        self.levels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, levels: &Levels) {
        self.handle.set_volume(levels.base * levels.gain);
    }

    pub(super) fn set_base(&self, base: f32) {
        let mut levels = self.lock();
        levels.base = base;
        self.apply(&levels);
    }

    pub(super) fn set_gain(&self, gain: f32) {
        let mut levels = self.lock();
        levels.gain = gain.clamp(0.0, 1.0);
        self.apply(&levels);
    }

    pub(super) fn gain(&self) -> f32 {
        self.lock().gain
    }

    pub(super) fn effective(&self) -> f32 {
        let levels = self.lock();
        levels.base * levels.gain
    }

    pub(super) fn handle(&self) -> &Arc<dyn PlaybackHandle> {
        &self.handle
    }
}

/// One track's part of a fade.
pub(super) struct FadeLeg {
    pub(super) mix: Arc<Mix>,
    pub(super) from: f32,
    pub(super) to: f32,
}

/// Step every leg together over `duration`, landing exactly on each `to`.
///
/// Returns `false` if `token` was cancelled first; no gain is touched after
/// cancellation.
pub(super) async fn run_fade(
    legs: Vec<FadeLeg>,
    duration: Duration,
    step: Duration,
    token: CancellationToken,
) -> bool {
    let steps = step_count(duration, step);
    let interval = duration / steps;

    for i in 1..=steps {
        tokio::select! {
            biased;
            _ = token.cancelled() => return false,
            _ = tokio::time::sleep(interval) => {}
        }
        if token.is_cancelled() {
            return false;
        }

        let t = i as f32 / steps as f32;
        for leg in &legs {
            let gain = if i == steps {
                leg.to
            } else {
                leg.from + (leg.to - leg.from) * t
            };
            leg.mix.set_gain(gain);
        }
    }
    true
}

/// Number of gain updates for a fade, at least one and saturating for
/// absurdly long fades.
fn step_count(duration: Duration, step: Duration) -> u32 {
    let step_ms = step.as_millis().max(1);
    u32::try_from(duration.as_millis() / step_ms)
        .unwrap_or(u32::MAX)
        .max(1)
}
