//! Audio Sequencer: per-category track ownership, crossfades, ducking.
//!
//! A single actor task owns every category slot. Callers hold a cloneable
//! [`AudioSequencer`] handle; fade and playback completions come back to the
//! actor as messages tagged with a generation or track id, so stale ones are
//! ignored.
//!
//! # Invariants
//!
//! - At most one live (`current`) track per category
//! - A track being faded out is moved to `outgoing` at once and is not live
//! - Output volume is always recomputed from configured values, never from
//!   the previous output volume

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use partyline_domain::AudioCategory;
use partyline_shared::AudioCue;

use super::catalog::TrackCatalog;
use super::fade::{run_fade, FadeLeg, Mix};
use super::output::AudioOutput;
use crate::settings::AudioSettings;

// =============================================================================
// Handle
// =============================================================================

enum Command {
    Play {
        category: AudioCategory,
        key: String,
        duck: bool,
    },
    FadeOut(AudioCategory),
    StopAll,
    SetVolume(AudioCategory, f32),
    SetMuted(AudioCategory, bool),
    Snapshot(oneshot::Sender<SequencerSnapshot>),
}

/// Handle to a running sequencer. Dropping every clone stops all playback.
#[derive(Clone)]
pub struct AudioSequencer {
    tx: mpsc::UnboundedSender<Command>,
}

impl AudioSequencer {
    /// Start the sequencer actor on the current tokio runtime.
    pub fn spawn(
        output: Arc<dyn AudioOutput>,
        catalog: TrackCatalog,
        settings: AudioSettings,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let actor = SequencerActor::new(output, catalog, settings, internal_tx);
        tokio::spawn(actor.run(rx, internal_rx));
        Self { tx }
    }

    fn send(&self, command: Command) {
        if self.tx.send(command).is_err() {
            tracing::debug!("Audio sequencer is gone, command dropped");
        }
    }

    pub fn play(&self, category: AudioCategory, key: impl Into<String>) {
        self.send(Command::Play {
            category,
            key: key.into(),
            duck: false,
        });
    }

    /// Play an `audioplay` cue. `duck` only has an effect on narrator cues.
    pub fn play_cue(&self, cue: &AudioCue) {
        self.send(Command::Play {
            category: cue.category,
            key: cue.track.clone(),
            duck: cue.duck && cue.category == AudioCategory::Narrator,
        });
    }

    pub fn fade_out(&self, category: AudioCategory) {
        self.send(Command::FadeOut(category));
    }

    pub fn stop_all(&self) {
        self.send(Command::StopAll);
    }

    pub fn set_volume(&self, category: AudioCategory, volume: f32) {
        self.send(Command::SetVolume(category, volume));
    }

    pub fn set_muted(&self, category: AudioCategory, muted: bool) {
        self.send(Command::SetMuted(category, muted));
    }

    /// Current state, after every previously sent command was applied.
    pub async fn snapshot(&self) -> Option<SequencerSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx));
        rx.await.ok()
    }
}

// =============================================================================
// Snapshot
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct CategorySnapshot {
    /// Key of the live track.
    pub current: Option<String>,
    /// Key of the track fading out.
    pub outgoing: Option<String>,
    pub pending: Option<String>,
    pub transitioning: bool,
    /// Configured category volume, independent of mute.
    pub volume: f32,
    pub muted: bool,
    /// Output volume of the live track right now.
    pub output_volume: Option<f32>,
}

impl CategorySnapshot {
    pub fn live_tracks(&self) -> usize {
        usize::from(self.current.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none() && self.outgoing.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SequencerSnapshot {
    pub music: CategorySnapshot,
    pub effect: CategorySnapshot,
    pub narrator: CategorySnapshot,
}

impl SequencerSnapshot {
    pub fn get(&self, category: AudioCategory) -> &CategorySnapshot {
        match category {
            AudioCategory::Music => &self.music,
            AudioCategory::Effect => &self.effect,
            AudioCategory::Narrator => &self.narrator,
        }
    }
}

// =============================================================================
// Actor
// =============================================================================

enum Internal {
    TransitionDone {
        category: AudioCategory,
        generation: u64,
    },
    Finished {
        category: AudioCategory,
        track_id: u64,
    },
}

struct Track {
    id: u64,
    key: String,
    /// Target volume from the catalogue.
    volume: f32,
    fade: Duration,
    duck: bool,
    mix: Arc<Mix>,
}

impl Track {
    fn stop(&self) {
        self.mix.handle().stop();
    }
}

struct PendingPlay {
    key: String,
    duck: bool,
}

struct Transition {
    generation: u64,
    token: CancellationToken,
}

struct CategorySlot {
    volume: f32,
    muted: bool,
    current: Option<Track>,
    outgoing: Option<Track>,
    /// Depth-1 queue; last request wins.
    pending: Option<PendingPlay>,
    transition: Option<Transition>,
}

impl Default for CategorySlot {
    fn default() -> Self {
        Self {
            volume: 1.0,
            muted: false,
            current: None,
            outgoing: None,
            pending: None,
            transition: None,
        }
    }
}

impl CategorySlot {
    fn cancel_transition(&mut self) {
        if let Some(transition) = self.transition.take() {
            transition.token.cancel();
        }
        if let Some(outgoing) = self.outgoing.take() {
            outgoing.stop();
        }
    }

    fn snapshot(&self) -> CategorySnapshot {
        CategorySnapshot {
            current: self.current.as_ref().map(|t| t.key.clone()),
            outgoing: self.outgoing.as_ref().map(|t| t.key.clone()),
            pending: self.pending.as_ref().map(|p| p.key.clone()),
            transitioning: self.transition.is_some(),
            volume: self.volume,
            muted: self.muted,
            output_volume: self.current.as_ref().map(|t| t.mix.effective()),
        }
    }
}

struct SequencerActor {
    output: Arc<dyn AudioOutput>,
    catalog: TrackCatalog,
    settings: AudioSettings,
    slots: HashMap<AudioCategory, CategorySlot>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    next_track_id: u64,
    next_generation: u64,
}

impl SequencerActor {
    fn new(
        output: Arc<dyn AudioOutput>,
        catalog: TrackCatalog,
        settings: AudioSettings,
        internal_tx: mpsc::UnboundedSender<Internal>,
    ) -> Self {
        Self {
            output,
            catalog,
            settings,
            slots: AudioCategory::ALL
                .into_iter()
                .map(|c| (c, CategorySlot::default()))
                .collect(),
            internal_tx,
            next_track_id: 0,
            next_generation: 0,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(event) = internal.recv() => self.handle_internal(event),
            }
        }
        self.stop_all();
        tracing::debug!("Audio sequencer stopped");
    }

    fn slot_mut(&mut self, category: AudioCategory) -> &mut CategorySlot {
        self.slots.entry(category).or_default()
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Play {
                category,
                key,
                duck,
            } => self.play(category, key, duck),
            Command::FadeOut(category) => self.fade_out(category),
            Command::StopAll => self.stop_all(),
            Command::SetVolume(category, volume) => {
                self.slot_mut(category).volume = volume.clamp(0.0, 1.0);
                self.refresh(category);
            }
            Command::SetMuted(category, muted) => {
                self.slot_mut(category).muted = muted;
                self.refresh(category);
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn handle_internal(&mut self, event: Internal) {
        match event {
            Internal::TransitionDone {
                category,
                generation,
            } => self.transition_done(category, generation),
            Internal::Finished { category, track_id } => self.track_finished(category, track_id),
        }
    }

    // =========================================================================
    // Operations
    // =========================================================================

    fn play(&mut self, category: AudioCategory, key: String, duck: bool) {
        let slot = self.slot_mut(category);
        let is_current = slot.current.as_ref().is_some_and(|t| t.key == key);

        if slot.transition.is_some() {
            if is_current {
                if slot.pending.take().is_some() {
                    tracing::debug!(category = %category, key = %key, "Current track requested again, pending request dropped");
                }
                return;
            }
            tracing::debug!(category = %category, key = %key, "Transition in flight, request queued");
            slot.pending = Some(PendingPlay { key, duck });
            return;
        }

        if is_current {
            tracing::trace!(category = %category, key = %key, "Track already live");
            return;
        }

        self.start(category, key, duck);
    }

    /// Open `key` and make it the live track, crossfading from the previous
    /// one. Only called with no transition in flight.
    fn start(&mut self, category: AudioCategory, key: String, duck: bool) {
        let spec = self.catalog.get(&key).cloned().unwrap_or_default();
        let looping = spec.is_looping(category);
        let fade = spec.fade().unwrap_or_else(|| self.settings.fade_for(category));

        let handle = match self.output.open(&key, looping) {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(category = %category, key = %key, error = %e, "Track could not be played");
                self.fade_out(category);
                return;
            }
        };

        self.next_track_id += 1;
        let track = Track {
            id: self.next_track_id,
            key,
            volume: spec.volume.clamp(0.0, 1.0),
            fade,
            duck,
            mix: Mix::new(handle, 0.0, if fade.is_zero() { 1.0 } else { 0.0 }),
        };
        self.watch_finished(category, &track);

        tracing::info!(
            category = %category,
            key = %track.key,
            fade_ms = fade.as_millis() as u64,
            looping,
            "Track started"
        );

        let incoming = Arc::clone(&track.mix);
        let slot = self.slot_mut(category);
        if let Some(stale) = slot.outgoing.take() {
            stale.stop();
        }
        let previous = slot.current.replace(track);

        if fade.is_zero() {
            if let Some(previous) = previous {
                previous.stop();
            }
        } else {
            let mut legs = vec![FadeLeg {
                mix: incoming,
                from: 0.0,
                to: 1.0,
            }];
            if let Some(previous) = previous {
                legs.push(FadeLeg {
                    mix: Arc::clone(&previous.mix),
                    from: previous.mix.gain(),
                    to: 0.0,
                });
                slot.outgoing = Some(previous);
            }
            self.begin_transition(category, legs, fade);
        }

        self.refresh(category);
        if category == AudioCategory::Narrator {
            self.refresh(AudioCategory::Music);
        }
    }

    fn fade_out(&mut self, category: AudioCategory) {
        let slot = self.slot_mut(category);
        slot.pending = None;
        slot.cancel_transition();

        let Some(current) = slot.current.take() else {
            return;
        };

        if current.fade.is_zero() {
            current.stop();
        } else {
            let fade = current.fade;
            let legs = vec![FadeLeg {
                mix: Arc::clone(&current.mix),
                from: current.mix.gain(),
                to: 0.0,
            }];
            slot.outgoing = Some(current);
            self.begin_transition(category, legs, fade);
        }
        tracing::debug!(category = %category, "Category fading out");

        if category == AudioCategory::Narrator {
            self.refresh(AudioCategory::Music);
        }
    }

    fn stop_all(&mut self) {
        for slot in self.slots.values_mut() {
            slot.pending = None;
            slot.cancel_transition();
            if let Some(current) = slot.current.take() {
                current.stop();
            }
        }
        tracing::debug!("All categories stopped");
    }

    // =========================================================================
    // Completions
    // =========================================================================

    fn transition_done(&mut self, category: AudioCategory, generation: u64) {
        let slot = self.slot_mut(category);
        if slot.transition.as_ref().map(|t| t.generation) != Some(generation) {
            tracing::trace!(category = %category, generation, "Stale transition completion ignored");
            return;
        }
        slot.transition = None;
        if let Some(outgoing) = slot.outgoing.take() {
            outgoing.stop();
        }

        let Some(pending) = slot.pending.take() else {
            return;
        };
        if slot.current.as_ref().is_some_and(|t| t.key == pending.key) {
            tracing::debug!(category = %category, key = %pending.key, "Pending request matches live track, discarded");
            return;
        }
        self.start(category, pending.key, pending.duck);
    }

    fn track_finished(&mut self, category: AudioCategory, track_id: u64) {
        let slot = self.slot_mut(category);
        if slot.current.as_ref().is_some_and(|t| t.id == track_id) {
            if let Some(track) = slot.current.take() {
                tracing::debug!(category = %category, key = %track.key, "Track completed");
            }
            if category == AudioCategory::Narrator {
                self.refresh(AudioCategory::Music);
            }
        } else if slot.outgoing.as_ref().is_some_and(|t| t.id == track_id) {
            slot.outgoing = None;
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn begin_transition(&mut self, category: AudioCategory, legs: Vec<FadeLeg>, duration: Duration) {
        self.next_generation += 1;
        let generation = self.next_generation;
        let token = CancellationToken::new();

        let step = self.settings.fade_step;
        let tx = self.internal_tx.clone();
        let fade_token = token.clone();
        tokio::spawn(async move {
            if run_fade(legs, duration, step, fade_token).await {
                let _ = tx.send(Internal::TransitionDone {
                    category,
                    generation,
                });
            }
        });

        self.slot_mut(category).transition = Some(Transition { generation, token });
    }

    fn watch_finished(&self, category: AudioCategory, track: &Track) {
        let handle = Arc::clone(track.mix.handle());
        let track_id = track.id;
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            handle.finished().await;
            let _ = tx.send(Internal::Finished { category, track_id });
        });
    }

    fn narration_ducks(&self) -> bool {
        self.slots
            .get(&AudioCategory::Narrator)
            .and_then(|slot| slot.current.as_ref())
            .is_some_and(|track| track.duck)
    }

    fn base_volume(&self, category: AudioCategory, slot: &CategorySlot, track: &Track) -> f32 {
        if slot.muted {
            return 0.0;
        }
        let mut volume = track.volume * slot.volume;
        if category == AudioCategory::Music && self.narration_ducks() {
            volume *= self.settings.duck_factor;
        }
        volume
    }

    /// Re-apply configured levels to every track of a category.
    fn refresh(&self, category: AudioCategory) {
        let Some(slot) = self.slots.get(&category) else {
            return;
        };
        for track in slot.current.iter().chain(slot.outgoing.iter()) {
            track.mix.set_base(self.base_volume(category, slot, track));
        }
    }

    fn snapshot(&self) -> SequencerSnapshot {
        let get = |category| {
            self.slots
                .get(&category)
                .map(CategorySlot::snapshot)
                .unwrap_or_else(|| CategorySlot::default().snapshot())
        };
        SequencerSnapshot {
            music: get(AudioCategory::Music),
            effect: get(AudioCategory::Effect),
            narrator: get(AudioCategory::Narrator),
        }
    }
}
