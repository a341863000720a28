//! Player entity and the profile a player supplies when joining.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::ConnectionId;
use crate::value_objects::PlayerName;

/// What a player sends in `client:join`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub name: PlayerName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Opaque token that lets a reconnecting player reclaim its identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl PlayerProfile {
    pub fn new(name: PlayerName) -> Self {
        Self {
            name,
            avatar: None,
            credential: None,
        }
    }

    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = Some(avatar.into());
        self
    }

    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }
}

/// A participant in a room.
///
/// # Invariants
///
/// - A `Room` holds at most one `Player` per connection id.
/// - The resume credential never leaves the host (`#[serde(skip)]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    id: ConnectionId,
    name: PlayerName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    avatar: Option<String>,
    /// Per-game state bag, owned by whichever module is active.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    state: Map<String, Value>,
    #[serde(skip)]
    credential: Option<String>,
}

impl Player {
    pub fn new(id: ConnectionId, profile: PlayerProfile) -> Self {
        Self {
            id,
            name: profile.name,
            avatar: profile.avatar,
            state: Map::new(),
            credential: profile.credential,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    #[inline]
    pub fn connection_id(&self) -> ConnectionId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &PlayerName {
        &self.name
    }

    #[inline]
    pub fn avatar(&self) -> Option<&str> {
        self.avatar.as_deref()
    }

    #[inline]
    pub fn state(&self) -> &Map<String, Value> {
        &self.state
    }

    pub fn state_value(&self, key: &str) -> Option<&Value> {
        self.state.get(key)
    }

    #[inline]
    pub fn credential(&self) -> Option<&str> {
        self.credential.as_deref()
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Set a key in the state bag. `Value::Null` removes the key.
    pub fn set_state(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if value.is_null() {
            self.state.remove(&key);
        } else {
            self.state.insert(key, value);
        }
    }

    pub fn clear_state(&mut self) {
        self.state.clear();
    }

    /// Apply a repeated join. Returns `true` when anything visible changed.
    pub(crate) fn apply_profile(&mut self, profile: PlayerProfile) -> bool {
        let changed = self.name != profile.name || self.avatar != profile.avatar;
        self.name = profile.name;
        self.avatar = profile.avatar;
        if profile.credential.is_some() {
            self.credential = profile.credential;
        }
        changed
    }

    pub(crate) fn reassign(&mut self, id: ConnectionId) {
        self.id = id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn profile(name: &str) -> PlayerProfile {
        PlayerProfile::new(PlayerName::new(name).unwrap())
    }

    #[test]
    fn credential_is_not_serialized() {
        let player = Player::new(ConnectionId::new(), profile("Ada").with_credential("secret"));
        let json = serde_json::to_value(&player).unwrap();
        assert!(json.get("credential").is_none());
        assert_eq!(json["name"], "Ada");
    }

    #[test]
    fn null_removes_state_key() {
        let mut player = Player::new(ConnectionId::new(), profile("Ada"));
        player.set_state("vote", json!("pizza"));
        assert_eq!(player.state_value("vote"), Some(&json!("pizza")));
        player.set_state("vote", Value::Null);
        assert!(player.state().is_empty());
    }

    #[test]
    fn profile_deserializes_without_optionals() {
        let profile: PlayerProfile = serde_json::from_value(json!({"name": "Bo"})).unwrap();
        assert_eq!(profile.name.as_str(), "Bo");
        assert!(profile.avatar.is_none());
        assert!(profile.credential.is_none());
    }
}
