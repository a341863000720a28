//! Audio Sequencer and its output port.
//!
//! The sequencer decides what plays per category; an [`AudioOutput`] turns
//! track keys into playback handles.

mod catalog;
mod fade;
mod output;
mod sequencer;
mod simulated;

pub use catalog::{TrackCatalog, TrackSpec};
pub use output::{AudioError, AudioOutput, PlaybackHandle};
pub use sequencer::{AudioSequencer, CategorySnapshot, SequencerSnapshot};
pub use simulated::{SimulatedOutput, SimulatedPlayback};

#[cfg(test)]
pub use output::MockAudioOutput;
