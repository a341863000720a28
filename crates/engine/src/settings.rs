//! Relay configuration read from the environment.

use std::net::SocketAddr;

/// Relay server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySettings {
    pub host: String,
    pub port: u16,
    /// Comma separated origins, or `*`. No CORS layer when unset.
    pub cors_allowed_origins: Option<String>,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3456,
            cors_allowed_origins: None,
        }
    }
}

impl RelaySettings {
    /// Read `RELAY_HOST`, `RELAY_PORT` (or `PORT`) and `CORS_ALLOWED_ORIGINS`.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, SettingsError> {
        let defaults = Self::default();
        let host = lookup("RELAY_HOST").unwrap_or(defaults.host);
        let port = match lookup("RELAY_PORT").or_else(|| lookup("PORT")) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| SettingsError::InvalidPort(raw))?,
            None => defaults.port,
        };
        let cors_allowed_origins = lookup("CORS_ALLOWED_ORIGINS")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(Self {
            host,
            port,
            cors_allowed_origins,
        })
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, SettingsError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| SettingsError::InvalidAddress(format!("{}:{}", self.host, self.port)))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Invalid relay port: {0}")]
    InvalidPort(String),
    #[error("Invalid listen address: {0}")]
    InvalidAddress(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let settings = RelaySettings::from_lookup(lookup(&[])).expect("settings");
        assert_eq!(settings, RelaySettings::default());
        assert_eq!(settings.socket_addr().expect("addr").port(), 3456);
    }

    #[test]
    fn port_falls_back_to_port_variable() {
        let settings = RelaySettings::from_lookup(lookup(&[("PORT", "8080")])).expect("settings");
        assert_eq!(settings.port, 8080);

        let settings = RelaySettings::from_lookup(lookup(&[("PORT", "8080"), ("RELAY_PORT", "9000")]))
            .expect("settings");
        assert_eq!(settings.port, 9000);
    }

    #[test]
    fn invalid_port_is_an_error() {
        let err = RelaySettings::from_lookup(lookup(&[("RELAY_PORT", "lots")])).expect_err("port");
        assert!(matches!(err, SettingsError::InvalidPort(ref raw) if raw == "lots"));
    }
}
