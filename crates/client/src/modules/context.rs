//! The handle a game module uses to act on the session.

use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use partyline_domain::{ConnectionId, GameName, Role};
use partyline_shared::{AudioCue, GameMessage, Request, Target};

use crate::audio::AudioSequencer;

/// Who a module request is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestTarget {
    Player(ConnectionId),
    AllPlayers,
}

/// What a module asks its session actor to do.
#[derive(Debug, Clone, PartialEq)]
pub enum ModuleCommand {
    /// Send a `server:request`; the session tracks it if it expects a response.
    Request {
        to: RequestTarget,
        request: Request,
    },
    Send {
        to: Target,
        message: GameMessage,
    },
    UpdatePlayer {
        player: ConnectionId,
        key: String,
        value: Value,
    },
    SetPhase(Option<String>),
    /// Show a request on this machine's own screen.
    Display(Request),
    ClearScreen,
    /// A timer scheduled with [`ModuleContext::schedule`] fired.
    Timer(String),
}

impl ModuleCommand {
    /// Commands a module may still issue while it is being torn down.
    pub fn is_teardown(&self) -> bool {
        matches!(self, ModuleCommand::ClearScreen)
    }
}

/// A command stamped with the load generation of the module that sent it.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleMessage {
    pub generation: u64,
    pub command: ModuleCommand,
}

/// Per-module view of the session. Cheap to clone.
///
/// Timers scheduled through the context die with the module: the loader
/// cancels `lifetime` before calling `end`.
#[derive(Clone)]
pub struct ModuleContext {
    role: Role,
    game: Option<GameName>,
    generation: u64,
    audio: AudioSequencer,
    commands: mpsc::UnboundedSender<ModuleMessage>,
    lifetime: CancellationToken,
}

impl ModuleContext {
    /// Template context the loader derives per-module contexts from.
    pub fn new(
        role: Role,
        audio: AudioSequencer,
        commands: mpsc::UnboundedSender<ModuleMessage>,
    ) -> Self {
        Self {
            role,
            game: None,
            generation: 0,
            audio,
            commands,
            lifetime: CancellationToken::new(),
        }
    }

    pub(super) fn for_module(&self, game: GameName, generation: u64) -> Self {
        Self {
            role: self.role,
            game: Some(game),
            generation,
            audio: self.audio.clone(),
            commands: self.commands.clone(),
            lifetime: CancellationToken::new(),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    #[inline]
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn game(&self) -> Option<&GameName> {
        self.game.as_ref()
    }

    #[inline]
    pub fn audio(&self) -> &AudioSequencer {
        &self.audio
    }

    pub fn lifetime(&self) -> &CancellationToken {
        &self.lifetime
    }

    // =========================================================================
    // Commands
    // =========================================================================

    fn command(&self, command: ModuleCommand) {
        let message = ModuleMessage {
            generation: self.generation,
            command,
        };
        if self.commands.send(message).is_err() {
            tracing::debug!(game = ?self.game, "Session gone, module command dropped");
        }
    }

    pub fn request(&self, to: RequestTarget, request: Request) {
        self.command(ModuleCommand::Request { to, request });
    }

    pub fn request_all(&self, request: Request) {
        self.request(RequestTarget::AllPlayers, request);
    }

    pub fn request_player(&self, player: ConnectionId, request: Request) {
        self.request(RequestTarget::Player(player), request);
    }

    pub fn send(&self, to: Target, message: GameMessage) {
        self.command(ModuleCommand::Send { to, message });
    }

    /// Play a cue on this machine and forward it to every player.
    pub fn broadcast_audio(&self, cue: AudioCue) {
        self.audio.play_cue(&cue);
        self.send(Target::Players, GameMessage::AudioPlay(cue));
    }

    /// Set a key in a player's state bag. `Value::Null` removes it.
    pub fn update_player(&self, player: ConnectionId, key: impl Into<String>, value: Value) {
        self.command(ModuleCommand::UpdatePlayer {
            player,
            key: key.into(),
            value,
        });
    }

    pub fn set_phase(&self, phase: impl Into<String>) {
        self.command(ModuleCommand::SetPhase(Some(phase.into())));
    }

    pub fn display(&self, request: Request) {
        self.command(ModuleCommand::Display(request));
    }

    pub fn clear_screen(&self) {
        self.command(ModuleCommand::ClearScreen);
    }

    /// Deliver `ModuleEvent::Timer(tag)` to this module after `delay`.
    pub fn schedule(&self, tag: impl Into<String>, delay: Duration) {
        let tag = tag.into();
        let generation = self.generation;
        let commands = self.commands.clone();
        let lifetime = self.lifetime.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = lifetime.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = commands.send(ModuleMessage {
                        generation,
                        command: ModuleCommand::Timer(tag),
                    });
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{SimulatedOutput, TrackCatalog};
    use crate::settings::AudioSettings;
    use std::sync::Arc;

    fn context() -> (ModuleContext, mpsc::UnboundedReceiver<ModuleMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let audio = AudioSequencer::spawn(
            Arc::new(SimulatedOutput::new(TrackCatalog::new())),
            TrackCatalog::new(),
            AudioSettings::default(),
        );
        let template = ModuleContext::new(Role::Host, audio, tx);
        (
            template.for_module(GameName::new("poll").expect("name"), 7),
            rx,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_timer_carries_generation() {
        let (ctx, mut rx) = context();
        ctx.schedule("close", Duration::from_secs(3));

        let command = rx.recv().await.expect("timer");
        assert_eq!(
            command,
            ModuleMessage {
                generation: 7,
                command: ModuleCommand::Timer("close".into()),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_lifetime_drops_timers() {
        let (ctx, mut rx) = context();
        ctx.schedule("close", Duration::from_secs(3));
        ctx.lifetime().cancel();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_audio_forwards_to_players() {
        let (ctx, mut rx) = context();
        let cue = AudioCue::new(partyline_domain::AudioCategory::Effect, "ding");
        ctx.broadcast_audio(cue.clone());

        assert_eq!(
            rx.recv().await.expect("command").command,
            ModuleCommand::Send {
                to: Target::Players,
                message: GameMessage::AudioPlay(cue)
            }
        );
    }

    #[tokio::test]
    async fn every_command_carries_the_module_generation() {
        let (ctx, mut rx) = context();
        ctx.set_phase("voting");
        ctx.clear_screen();

        for _ in 0..2 {
            assert_eq!(rx.recv().await.expect("command").generation, 7);
        }
    }
}
