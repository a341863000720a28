//! Room aggregate - the authoritative session state owned by the host.
//!
//! # Invariants
//!
//! - At most one `Player` per connection id
//! - `players` is kept in join order
//! - A departed player is kept only as a resume candidate, keyed by the
//!   credential it joined with, for the lifetime of the room

use std::collections::HashMap;

use crate::entities::{Player, PlayerProfile};
use crate::ids::ConnectionId;
use crate::value_objects::{GameName, RoomCode};

/// Result of `Room::join`.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinOutcome {
    /// A fresh player was appended.
    Added(Player),
    /// A player presented a known credential and got its identity back.
    /// `replaced` is the stale connection id it held, if it was still live.
    Rejoined {
        player: Player,
        replaced: Option<ConnectionId>,
    },
    /// Repeated join from the same connection with a new name or avatar.
    Updated(Player),
    /// Repeated join that changed nothing.
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct Room {
    code: RoomCode,
    active_game: Option<GameName>,
    /// Round or phase tag set by the active module.
    phase: Option<String>,
    players: Vec<Player>,
    departed: HashMap<String, Player>,
}

impl Room {
    pub fn new(code: RoomCode) -> Self {
        Self {
            code,
            active_game: None,
            phase: None,
            players: Vec::new(),
            departed: HashMap::new(),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    #[inline]
    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    #[inline]
    pub fn active_game(&self) -> Option<&GameName> {
        self.active_game.as_ref()
    }

    #[inline]
    pub fn phase(&self) -> Option<&str> {
        self.phase.as_deref()
    }

    /// Players in join order.
    #[inline]
    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, id: ConnectionId) -> Option<&Player> {
        self.players.iter().find(|p| p.connection_id() == id)
    }

    pub fn player_mut(&mut self, id: ConnectionId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.connection_id() == id)
    }

    pub fn player_at(&self, index: usize) -> Option<&Player> {
        self.players.get(index)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.player(id).is_some()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.players.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn departed_count(&self) -> usize {
        self.departed.len()
    }

    /// Owned copy of the ordered player list, as sent in `playersinroom`.
    pub fn snapshot(&self) -> Vec<Player> {
        self.players.clone()
    }

    // =========================================================================
    // Session state
    // =========================================================================

    /// Record the active game. Clearing it also clears the phase; a game
    /// that just started may already have set its own.
    pub fn set_active_game(&mut self, game: Option<GameName>) {
        if game.is_none() {
            self.phase = None;
        }
        self.active_game = game;
    }

    pub fn set_phase(&mut self, phase: Option<String>) {
        self.phase = phase;
    }

    /// Swap the room code, e.g. when the relay hands out a new room after a
    /// reconnect. Players are kept.
    pub fn rename(&mut self, code: RoomCode) {
        self.code = code;
    }

    // =========================================================================
    // Membership
    // =========================================================================

    /// Register a `client:join` from `id`.
    pub fn join(&mut self, id: ConnectionId, profile: PlayerProfile) -> JoinOutcome {
        if let Some(existing) = self.player_mut(id) {
            return if existing.apply_profile(profile) {
                JoinOutcome::Updated(existing.clone())
            } else {
                JoinOutcome::Unchanged
            };
        }

        let Some(credential) = profile.credential.clone() else {
            let player = Player::new(id, profile);
            self.players.push(player.clone());
            return JoinOutcome::Added(player);
        };

        // Same credential still attached to a live connection: the old socket
        // is stale, move the identity over and keep its seat.
        if let Some(player) = self
            .players
            .iter_mut()
            .find(|p| p.credential() == Some(credential.as_str()))
        {
            let replaced = player.connection_id();
            player.reassign(id);
            player.apply_profile(profile);
            return JoinOutcome::Rejoined {
                player: player.clone(),
                replaced: Some(replaced),
            };
        }

        if let Some(mut player) = self.departed.remove(&credential) {
            player.reassign(id);
            player.apply_profile(profile);
            self.players.push(player.clone());
            return JoinOutcome::Rejoined {
                player,
                replaced: None,
            };
        }

        let player = Player::new(id, profile);
        self.players.push(player.clone());
        JoinOutcome::Added(player)
    }

    /// Remove a disconnected player. Players with a credential are kept as
    /// resume candidates.
    pub fn remove(&mut self, id: ConnectionId) -> Option<Player> {
        let pos = self.players.iter().position(|p| p.connection_id() == id)?;
        let player = self.players.remove(pos);
        if let Some(credential) = player.credential() {
            self.departed.insert(credential.to_string(), player.clone());
        }
        Some(player)
    }

    /// Remove a player for good, forgetting its credential.
    pub fn purge(&mut self, id: ConnectionId) -> Option<Player> {
        let pos = self.players.iter().position(|p| p.connection_id() == id)?;
        let player = self.players.remove(pos);
        if let Some(credential) = player.credential() {
            self.departed.remove(credential);
        }
        Some(player)
    }

    /// Clear every player's state bag, e.g. when a new game starts.
    pub fn reset_player_state(&mut self) {
        for player in &mut self.players {
            player.clear_state();
        }
    }
}
