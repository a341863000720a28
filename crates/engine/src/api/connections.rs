//! Connection management for relay clients.
//!
//! Tracks connected sockets, the room each one sits in and its role there.
//! One host and any number of players per room. Rooms exist while at least
//! one connection is in them.
//!
//! A connection whose outbound queue overflows is evicted: its socket is
//! closed so the client reconnects and gets a fresh catch-up instead of
//! silently missing frames.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use serde_json::Value;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Notify, RwLock};

use partyline_domain::{ConnectionId, Role, RoomCode};
use partyline_shared::{ErrorCode, PeerInfo, RelayFrame, Target};

/// Attempts at drawing an unused room code before giving up.
const MAX_CODE_ATTEMPTS: usize = 64;

/// Information about a connected client.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub connection_id: ConnectionId,
    /// The room this connection is in (if joined)
    pub room: Option<RoomCode>,
    /// Role in that room; meaningless while `room` is `None`
    pub role: Role,
}

impl ConnectionInfo {
    pub fn is_host(&self) -> bool {
        self.room.is_some() && self.role.is_host()
    }
}

/// Outbound side of a connection.
struct Outbound {
    sender: mpsc::Sender<RelayFrame>,
    /// Signalled when the connection has to be dropped.
    evicted: Arc<Notify>,
}

#[derive(Default)]
struct Registry {
    /// connection_id -> (info, outbound side)
    connections: HashMap<ConnectionId, (ConnectionInfo, Outbound)>,
    /// room -> members in arrival order
    rooms: HashMap<RoomCode, Vec<ConnectionId>>,
}

impl Registry {
    fn send(&self, to: ConnectionId, frame: RelayFrame) -> bool {
        let Some((info, outbound)) = self.connections.get(&to) else {
            return false;
        };
        match outbound.sender.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(
                    connection_id = %info.connection_id,
                    "Outbound queue full, evicting connection"
                );
                outbound.evicted.notify_one();
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(
                    connection_id = %info.connection_id,
                    "Frame for a closing connection dropped"
                );
                false
            }
        }
    }

    fn peers(&self, room: &RoomCode) -> Vec<PeerInfo> {
        self.rooms
            .get(room)
            .into_iter()
            .flatten()
            .filter_map(|id| self.connections.get(id))
            .map(|(info, _)| PeerInfo {
                connection_id: info.connection_id,
                role: info.role,
            })
            .collect()
    }

    fn host_of(&self, room: &RoomCode) -> Option<ConnectionId> {
        self.peers(room)
            .into_iter()
            .find(|p| p.role.is_host())
            .map(|p| p.connection_id)
    }

    fn unused_code(&self) -> Option<RoomCode> {
        let mut rng = rand::thread_rng();
        (0..MAX_CODE_ATTEMPTS)
            .map(|_| RoomCode::generate(|n| rng.gen_range(0..n)))
            .find(|code| !self.rooms.contains_key(code))
    }

    /// Put a connection into a room, tell it so, then tell everyone else.
    ///
    /// `RoomJoined` is queued before any peer can react to `Connect`, so the
    /// joiner always sees it first.
    fn enter(
        &mut self,
        connection_id: ConnectionId,
        room: RoomCode,
        role: Role,
    ) -> Result<(), ConnectionError> {
        let peers = self.peers(&room);
        let Some((info, _)) = self.connections.get_mut(&connection_id) else {
            return Err(ConnectionError::NotFound);
        };
        info.room = Some(room.clone());
        info.role = role;
        self.rooms
            .entry(room.clone())
            .or_default()
            .push(connection_id);

        self.send(
            connection_id,
            RelayFrame::RoomJoined {
                room: room.clone(),
                connection_id,
                role,
                peers: peers.clone(),
            },
        );
        for peer in &peers {
            self.send(peer.connection_id, RelayFrame::Connect { connection_id, role });
        }

        tracing::info!(
            connection_id = %connection_id,
            room = %room,
            role = %role,
            peers = peers.len(),
            "Connection joined room"
        );
        Ok(())
    }

    fn leave(&mut self, connection_id: ConnectionId) -> Option<RoomCode> {
        let (info, _) = self.connections.get_mut(&connection_id)?;
        let room = info.room.take()?;

        let remaining = match self.rooms.get_mut(&room) {
            Some(members) => {
                members.retain(|id| *id != connection_id);
                members.clone()
            }
            None => Vec::new(),
        };

        for peer in &remaining {
            self.send(*peer, RelayFrame::Disconnect { connection_id });
        }

        tracing::info!(connection_id = %connection_id, room = %room, "Connection left room");

        if remaining.is_empty() {
            self.rooms.remove(&room);
            tracing::info!(room = %room, "Room closed");
        }
        Some(room)
    }
}

/// Manages all active relay connections and rooms.
pub struct ConnectionManager {
    inner: RwLock<Registry>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Registry::default()),
        }
    }

    /// Register a new connection. It is in no room yet.
    ///
    /// The returned signal fires when the relay gives up on the connection;
    /// its socket should then be closed.
    pub async fn register(
        &self,
        connection_id: ConnectionId,
        sender: mpsc::Sender<RelayFrame>,
    ) -> Arc<Notify> {
        let info = ConnectionInfo {
            connection_id,
            room: None,
            role: Role::Player,
        };
        let evicted = Arc::new(Notify::new());
        let outbound = Outbound {
            sender,
            evicted: Arc::clone(&evicted),
        };
        let mut inner = self.inner.write().await;
        inner.connections.insert(connection_id, (info, outbound));
        tracing::debug!(connection_id = %connection_id, "Connection registered");
        evicted
    }

    /// Unregister a connection, leaving its room first.
    pub async fn unregister(&self, connection_id: ConnectionId) {
        let mut inner = self.inner.write().await;
        inner.leave(connection_id);
        if inner.connections.remove(&connection_id).is_some() {
            tracing::debug!(connection_id = %connection_id, "Connection unregistered");
        }
    }

    /// Get connection info by ID.
    pub async fn get(&self, connection_id: ConnectionId) -> Option<ConnectionInfo> {
        let inner = self.inner.read().await;
        inner
            .connections
            .get(&connection_id)
            .map(|(info, _)| info.clone())
    }

    /// Open a room with this connection as host.
    ///
    /// With a `preferred` code the host reclaims that room if it still exists
    /// (its players stay connected through a host reconnect) or recreates it.
    pub async fn create_room(
        &self,
        connection_id: ConnectionId,
        preferred: Option<RoomCode>,
    ) -> Result<RoomCode, ConnectionError> {
        let mut inner = self.inner.write().await;
        ensure_outside_room(&inner, connection_id)?;

        let room = match preferred {
            Some(code) => {
                if inner.host_of(&code).is_some() {
                    return Err(ConnectionError::HostAlreadyConnected(code));
                }
                code
            }
            None => inner
                .unused_code()
                .ok_or(ConnectionError::RoomCodesExhausted)?,
        };

        inner.enter(connection_id, room.clone(), Role::Host)?;
        Ok(room)
    }

    /// Join an existing room.
    pub async fn join_room(
        &self,
        connection_id: ConnectionId,
        room: RoomCode,
        role: Role,
    ) -> Result<(), ConnectionError> {
        let mut inner = self.inner.write().await;
        ensure_outside_room(&inner, connection_id)?;

        if !inner.rooms.contains_key(&room) {
            return Err(ConnectionError::RoomNotFound(room));
        }
        if role.is_host() && inner.host_of(&room).is_some() {
            return Err(ConnectionError::HostAlreadyConnected(room));
        }

        inner.enter(connection_id, room, role)
    }

    /// Leave the current room.
    pub async fn leave_room(&self, connection_id: ConnectionId) -> Result<RoomCode, ConnectionError> {
        let mut inner = self.inner.write().await;
        inner.leave(connection_id).ok_or(ConnectionError::NotInRoom)
    }

    /// Forward a game message to the addressed members of the sender's room.
    ///
    /// Returns how many connections it was queued for. Players may only
    /// address the host.
    pub async fn route(
        &self,
        from: ConnectionId,
        target: Target,
        message: Value,
    ) -> Result<usize, ConnectionError> {
        let inner = self.inner.read().await;
        let (info, _) = inner
            .connections
            .get(&from)
            .ok_or(ConnectionError::NotFound)?;
        let room = info.room.clone().ok_or(ConnectionError::NotInRoom)?;

        if !info.role.is_host() && target != Target::Host {
            return Err(ConnectionError::Forbidden);
        }

        let peers = inner.peers(&room);
        let recipients: Vec<ConnectionId> = match target {
            Target::Host => peers
                .iter()
                .filter(|p| p.role.is_host() && p.connection_id != from)
                .map(|p| p.connection_id)
                .collect(),
            Target::Players => peers
                .iter()
                .filter(|p| !p.role.is_host() && p.connection_id != from)
                .map(|p| p.connection_id)
                .collect(),
            Target::PlayersExcept(excluded) => peers
                .iter()
                .filter(|p| {
                    !p.role.is_host() && p.connection_id != from && p.connection_id != excluded
                })
                .map(|p| p.connection_id)
                .collect(),
            Target::Connection(id) => {
                if !peers.iter().any(|p| p.connection_id == id) || id == from {
                    return Err(ConnectionError::UnknownTarget(id));
                }
                vec![id]
            }
        };

        let delivered = recipients
            .into_iter()
            .filter(|to| {
                inner.send(
                    *to,
                    RelayFrame::Message {
                        from,
                        message: message.clone(),
                    },
                )
            })
            .count();

        tracing::trace!(
            connection_id = %from,
            room = %room,
            target = ?target,
            delivered,
            "Routed message"
        );
        Ok(delivered)
    }

    /// Members of a room in arrival order.
    pub async fn room_members(&self, room: &RoomCode) -> Vec<PeerInfo> {
        let inner = self.inner.read().await;
        inner.peers(room)
    }

    pub async fn room_count(&self) -> usize {
        self.inner.read().await.rooms.len()
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.connections.len()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

fn ensure_outside_room(inner: &Registry, connection_id: ConnectionId) -> Result<(), ConnectionError> {
    match inner.connections.get(&connection_id) {
        None => Err(ConnectionError::NotFound),
        Some((info, _)) if info.room.is_some() => Err(ConnectionError::AlreadyInRoom),
        Some(_) => Ok(()),
    }
}

/// Errors that can occur during connection operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("Connection not found")]
    NotFound,
    #[error("Connection is already in a room")]
    AlreadyInRoom,
    #[error("Connection is not in a room")]
    NotInRoom,
    #[error("Room {0} not found")]
    RoomNotFound(RoomCode),
    #[error("Room {0} already has a host")]
    HostAlreadyConnected(RoomCode),
    #[error("Players may only address the host")]
    Forbidden,
    #[error("Connection {0} is not in this room")]
    UnknownTarget(ConnectionId),
    #[error("No free room code available")]
    RoomCodesExhausted,
}

impl ConnectionError {
    /// Wire code reported back to the client.
    pub fn code(&self) -> ErrorCode {
        match self {
            ConnectionError::NotFound | ConnectionError::NotInRoom => ErrorCode::NotInRoom,
            ConnectionError::AlreadyInRoom => ErrorCode::AlreadyInRoom,
            ConnectionError::RoomNotFound(_) => ErrorCode::RoomNotFound,
            ConnectionError::HostAlreadyConnected(_) => ErrorCode::HostAlreadyConnected,
            ConnectionError::Forbidden => ErrorCode::Forbidden,
            ConnectionError::UnknownTarget(_) => ErrorCode::UnknownTarget,
            ConnectionError::RoomCodesExhausted => ErrorCode::RoomCodesExhausted,
        }
    }

    pub fn to_frame(&self) -> RelayFrame {
        RelayFrame::error(self.code(), self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn connect(manager: &ConnectionManager) -> (ConnectionId, mpsc::Receiver<RelayFrame>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(16);
        manager.register(id, tx).await;
        (id, rx)
    }

    fn code(s: &str) -> RoomCode {
        RoomCode::new(s).expect("code")
    }

    #[tokio::test]
    async fn full_outbound_queue_evicts_the_connection() {
        let manager = ConnectionManager::new();
        let (host, _host_rx) = connect(&manager).await;
        let player = ConnectionId::new();
        let (tx, mut player_rx) = mpsc::channel(1);
        let evicted = manager.register(player, tx).await;

        let room = manager.create_room(host, None).await.expect("create");
        manager
            .join_room(player, room, Role::Player)
            .await
            .expect("join");

        // RoomJoined already fills the player's queue.
        let delivered = manager
            .route(host, Target::Players, json!({"event": "tick"}))
            .await;
        assert_eq!(delivered, Ok(0));
        tokio::time::timeout(std::time::Duration::from_secs(1), evicted.notified())
            .await
            .expect("connection evicted");
        assert!(matches!(
            player_rx.recv().await,
            Some(RelayFrame::RoomJoined { .. })
        ));
    }

    #[tokio::test]
    async fn host_creates_room_and_gets_room_joined() {
        let manager = ConnectionManager::new();
        let (host, mut host_rx) = connect(&manager).await;

        let room = manager.create_room(host, None).await.expect("create");

        match host_rx.recv().await.expect("frame") {
            RelayFrame::RoomJoined {
                room: joined,
                role,
                peers,
                ..
            } => {
                assert_eq!(joined, room);
                assert_eq!(role, Role::Host);
                assert!(peers.is_empty());
            }
            other => panic!("unexpected frame: {:?}", other),
        }
        assert_eq!(manager.room_count().await, 1);
    }

    #[tokio::test]
    async fn player_join_notifies_existing_members() {
        let manager = ConnectionManager::new();
        let (host, mut host_rx) = connect(&manager).await;
        let (player, mut player_rx) = connect(&manager).await;
        let room = manager.create_room(host, Some(code("WXYZ"))).await.expect("create");
        let _ = host_rx.recv().await;

        manager.join_room(player, room, Role::Player).await.expect("join");

        match player_rx.recv().await.expect("frame") {
            RelayFrame::RoomJoined { peers, .. } => {
                assert_eq!(peers, vec![PeerInfo { connection_id: host, role: Role::Host }]);
            }
            other => panic!("unexpected frame: {:?}", other),
        }
        assert_eq!(
            host_rx.recv().await.expect("frame"),
            RelayFrame::Connect {
                connection_id: player,
                role: Role::Player
            }
        );
    }

    #[tokio::test]
    async fn second_host_is_rejected() {
        let manager = ConnectionManager::new();
        let (host, _host_rx) = connect(&manager).await;
        let (other, _other_rx) = connect(&manager).await;
        manager.create_room(host, Some(code("ABCD"))).await.expect("create");

        let err = manager
            .join_room(other, code("ABCD"), Role::Host)
            .await
            .expect_err("second host");
        assert_eq!(err.code(), ErrorCode::HostAlreadyConnected);

        let err = manager
            .create_room(other, Some(code("ABCD")))
            .await
            .expect_err("second host");
        assert_eq!(err, ConnectionError::HostAlreadyConnected(code("ABCD")));
    }

    #[tokio::test]
    async fn unknown_room_is_not_found() {
        let manager = ConnectionManager::new();
        let (player, _rx) = connect(&manager).await;
        let err = manager
            .join_room(player, code("QQQQ"), Role::Player)
            .await
            .expect_err("no room");
        assert_eq!(err.code(), ErrorCode::RoomNotFound);
    }

    #[tokio::test]
    async fn players_may_only_address_host() {
        let manager = ConnectionManager::new();
        let (host, mut host_rx) = connect(&manager).await;
        let (player, _player_rx) = connect(&manager).await;
        let room = manager.create_room(host, None).await.expect("create");
        manager.join_room(player, room, Role::Player).await.expect("join");
        while host_rx.try_recv().is_ok() {}

        assert_eq!(
            manager.route(player, Target::Players, json!({})).await,
            Err(ConnectionError::Forbidden)
        );
        assert_eq!(
            manager.route(player, Target::Host, json!({"event": "x"})).await,
            Ok(1)
        );
        assert_eq!(
            host_rx.recv().await.expect("frame"),
            RelayFrame::Message {
                from: player,
                message: json!({"event": "x"})
            }
        );
    }

    #[tokio::test]
    async fn players_except_skips_one_player() {
        let manager = ConnectionManager::new();
        let (host, _host_rx) = connect(&manager).await;
        let (a, mut a_rx) = connect(&manager).await;
        let (b, mut b_rx) = connect(&manager).await;
        let room = manager.create_room(host, None).await.expect("create");
        manager.join_room(a, room.clone(), Role::Player).await.expect("join");
        manager.join_room(b, room, Role::Player).await.expect("join");
        while a_rx.try_recv().is_ok() {}
        while b_rx.try_recv().is_ok() {}

        let delivered = manager
            .route(host, Target::PlayersExcept(a), json!(1))
            .await
            .expect("route");
        assert_eq!(delivered, 1);
        assert!(matches!(b_rx.try_recv(), Ok(RelayFrame::Message { .. })));
        assert!(a_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn last_leaver_closes_room() {
        let manager = ConnectionManager::new();
        let (host, _host_rx) = connect(&manager).await;
        let (player, mut player_rx) = connect(&manager).await;
        let room = manager.create_room(host, None).await.expect("create");
        manager.join_room(player, room.clone(), Role::Player).await.expect("join");
        let _ = player_rx.recv().await;

        manager.unregister(host).await;
        assert_eq!(
            player_rx.recv().await.expect("frame"),
            RelayFrame::Disconnect { connection_id: host }
        );
        assert_eq!(manager.room_count().await, 1);

        manager.leave_room(player).await.expect("leave");
        assert_eq!(manager.room_count().await, 0);
        assert!(manager.room_members(&room).await.is_empty());
    }

    #[tokio::test]
    async fn host_reclaims_room_after_reconnect() {
        let manager = ConnectionManager::new();
        let (host, _host_rx) = connect(&manager).await;
        let (player, mut player_rx) = connect(&manager).await;
        let room = manager.create_room(host, None).await.expect("create");
        manager.join_room(player, room.clone(), Role::Player).await.expect("join");
        manager.unregister(host).await;

        let (new_host, _rx) = connect(&manager).await;
        let reclaimed = manager
            .create_room(new_host, Some(room.clone()))
            .await
            .expect("reclaim");
        assert_eq!(reclaimed, room);

        let frames: Vec<_> = std::iter::from_fn(|| player_rx.try_recv().ok()).collect();
        assert!(frames.contains(&RelayFrame::Connect {
            connection_id: new_host,
            role: Role::Host
        }));
    }
}
