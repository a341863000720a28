use std::collections::HashMap;

use partyline_domain::{ConnectionId, RequestId};

/// Requests awaiting a response, at most one per player.
///
/// A response is accepted once, and only if it answers the request the
/// player currently holds. Each entry remembers the load generation of the
/// module that asked.
#[derive(Debug, Default)]
pub struct OutstandingRequests {
    by_player: HashMap<ConnectionId, (RequestId, u64)>,
}

impl OutstandingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `request` for `player`, superseding whatever it held.
    pub fn issue(&mut self, player: ConnectionId, request: RequestId, generation: u64) {
        if let Some((previous, _)) = self.by_player.insert(player, (request, generation)) {
            tracing::trace!(player = %player, superseded = %previous, "Outstanding request superseded");
        }
    }

    /// The player was sent something that needs no answer; its screen no
    /// longer shows the old request.
    pub fn supersede(&mut self, player: ConnectionId) {
        self.by_player.remove(&player);
    }

    /// Consume the outstanding entry if `request` matches it, returning the
    /// generation of the module that asked.
    pub fn accept(&mut self, player: ConnectionId, request: RequestId) -> Option<u64> {
        match self.by_player.get(&player) {
            Some((held, generation)) if *held == request => {
                let generation = *generation;
                self.by_player.remove(&player);
                Some(generation)
            }
            _ => None,
        }
    }

    /// Drop every request not issued by the module of `generation`.
    pub fn retain_generation(&mut self, generation: u64) {
        self.by_player.retain(|_, (_, g)| *g == generation);
    }

    pub fn forget(&mut self, player: ConnectionId) {
        self.by_player.remove(&player);
    }

    pub fn clear(&mut self) {
        self.by_player.clear();
    }

    pub fn len(&self) -> usize {
        self.by_player.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_player.is_empty()
    }
}
