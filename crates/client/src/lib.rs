//! Partyline client library: everything that runs on the host display and
//! on player devices.
//!
//! ## Structure
//!
//! - `relay/` - WebSocket transport to the relay, with reconnect
//! - `audio/` - per-category Audio Sequencer and its output port
//! - `modules/` - game module trait, registry, loader and demo games
//! - `dispatcher/` - player side request handling and screen state
//! - `coordinator/` - host side authoritative session actor
//! - `player/` - player side session actor
//! - `settings` - environment configuration

pub mod audio;
pub mod coordinator;
pub mod dispatcher;
pub mod modules;
pub mod player;
pub mod relay;
pub mod settings;

pub use settings::{AudioSettings, ClientSettings, SettingsError};

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use audio::{AudioError, AudioSequencer, SimulatedOutput, TrackCatalog};
use relay::{Outbox, RelayClient, RelayEvent};

/// Start the Audio Sequencer on the simulated backend, with the catalogue
/// from `PARTYLINE_TRACKS` or the bundled demo tracks.
pub fn spawn_audio(settings: &ClientSettings) -> Result<AudioSequencer, AudioError> {
    let catalog = match &settings.tracks_path {
        Some(path) => TrackCatalog::load(path)?,
        None => TrackCatalog::demo(),
    };
    tracing::info!(tracks = catalog.len(), "Track catalogue loaded");
    let output = Arc::new(SimulatedOutput::new(catalog.clone()));
    Ok(AudioSequencer::spawn(output, catalog, settings.audio.clone()))
}

/// Start the relay transport. It stops when `shutdown` fires or once every
/// [`Outbox`] clone is dropped and the queued frames are flushed.
pub fn spawn_relay(
    settings: &ClientSettings,
    shutdown: CancellationToken,
) -> (Outbox, mpsc::UnboundedReceiver<RelayEvent>, JoinHandle<()>) {
    let (outbox, outbound) = Outbox::channel();
    let (events_tx, events) = mpsc::unbounded_channel();
    let transport = RelayClient::new(settings.relay_url.clone())
        .with_heartbeat(settings.heartbeat)
        .spawn(outbound, events_tx, shutdown);
    (outbox, events, transport)
}

/// Install the `tracing` subscriber used by the client binaries.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "partyline_client=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Load `.env.local` / `.env` from the workspace root, if present.
pub fn load_dotenv_from_repo_root() {
    let repo_root = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..");

    for filename in [".env.local", ".env"] {
        let path = repo_root.join(filename);
        if path.exists() {
            let _ = dotenvy::from_path(path);
        }
    }
}
