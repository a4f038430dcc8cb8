//! Environment-driven configuration.
//!
//! All settings come from environment variables with sensible development
//! defaults. `from_vars` takes the environment as a map so tests can exercise
//! parsing without touching the process environment.

use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },
}

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Socket address the signaling server binds (`BIND_ADDRESS`).
    pub bind_address: String,
    /// Socket address the health server binds (`HEALTH_BIND_ADDRESS`).
    pub health_bind_address: String,
    /// Instance identifier for logs (`INSTANCE_ID`, random when unset).
    pub instance_id: String,
    /// Maximum concurrently live rooms (`MAX_ROOMS`).
    pub max_rooms: usize,
    /// Relay transport allocation timeout (`ALLOCATION_TIMEOUT_SECONDS`).
    pub allocation_timeout: Duration,
    /// Transport capacity of the embedded relay engine
    /// (`RELAY_MAX_TRANSPORTS`).
    pub relay_max_transports: usize,
    /// Seed room directory entries (`ROOM_DIRECTORY`), formatted as
    /// `room-id=owner-user-id` pairs separated by commas.
    pub room_directory: Vec<(String, String)>,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&std::env::vars().collect())
    }

    /// Load configuration from a map of variables.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| "0.0.0.0:8080".to_string());
        let health_bind_address = vars
            .get("HEALTH_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| "0.0.0.0:8081".to_string());
        let instance_id = vars
            .get("INSTANCE_ID")
            .cloned()
            .unwrap_or_else(|| format!("rc-{}", uuid::Uuid::new_v4()));

        let max_rooms = parse_positive(vars, "MAX_ROOMS", 10_000)?;
        let allocation_timeout_seconds = parse_positive(vars, "ALLOCATION_TIMEOUT_SECONDS", 10)?;
        let relay_max_transports = parse_positive(vars, "RELAY_MAX_TRANSPORTS", 1024)?;

        let room_directory = match vars.get("ROOM_DIRECTORY") {
            Some(raw) if !raw.trim().is_empty() => parse_room_directory(raw)?,
            _ => Vec::new(),
        };

        Ok(Self {
            bind_address,
            health_bind_address,
            instance_id,
            max_rooms,
            allocation_timeout: Duration::from_secs(allocation_timeout_seconds as u64),
            relay_max_transports,
            room_directory,
        })
    }
}

fn parse_positive(
    vars: &HashMap<String, String>,
    name: &str,
    default: usize,
) -> Result<usize, ConfigError> {
    match vars.get(name) {
        None => Ok(default),
        Some(raw) => {
            let value: usize = raw.parse().map_err(|_| ConfigError::InvalidValue {
                name: name.to_string(),
                reason: format!("expected a positive integer, got {raw:?}"),
            })?;
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    name: name.to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
            Ok(value)
        }
    }
}

fn parse_room_directory(raw: &str) -> Result<Vec<(String, String)>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (room_id, owner) =
                entry
                    .split_once('=')
                    .ok_or_else(|| ConfigError::InvalidValue {
                        name: "ROOM_DIRECTORY".to_string(),
                        reason: format!("expected room-id=owner-user-id, got {entry:?}"),
                    })?;
            if room_id.is_empty() || owner.is_empty() {
                return Err(ConfigError::InvalidValue {
                    name: "ROOM_DIRECTORY".to_string(),
                    reason: format!("empty room id or owner in {entry:?}"),
                });
            }
            Ok((room_id.to_string(), owner.to_string()))
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_vars(&HashMap::new()).unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:8080");
        assert_eq!(config.health_bind_address, "0.0.0.0:8081");
        assert_eq!(config.max_rooms, 10_000);
        assert_eq!(config.allocation_timeout, Duration::from_secs(10));
        assert_eq!(config.relay_max_transports, 1024);
        assert!(config.room_directory.is_empty());
        assert!(config.instance_id.starts_with("rc-"));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<String, String> = [
            ("BIND_ADDRESS", "127.0.0.1:9000"),
            ("MAX_ROOMS", "5"),
            ("ALLOCATION_TIMEOUT_SECONDS", "3"),
            ("INSTANCE_ID", "rc-test"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let config = Config::from_vars(&vars).unwrap();
        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.max_rooms, 5);
        assert_eq!(config.allocation_timeout, Duration::from_secs(3));
        assert_eq!(config.instance_id, "rc-test");
    }

    #[test]
    fn test_room_directory_parsing() {
        let vars: HashMap<String, String> = [(
            "ROOM_DIRECTORY".to_string(),
            "standup=alice, retro=bob".to_string(),
        )]
        .into_iter()
        .collect();

        let config = Config::from_vars(&vars).unwrap();
        assert_eq!(
            config.room_directory,
            vec![
                ("standup".to_string(), "alice".to_string()),
                ("retro".to_string(), "bob".to_string()),
            ]
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        for (name, value) in [
            ("MAX_ROOMS", "zero"),
            ("MAX_ROOMS", "0"),
            ("ALLOCATION_TIMEOUT_SECONDS", "-1"),
            ("ROOM_DIRECTORY", "no-equals-sign"),
            ("ROOM_DIRECTORY", "=missing-room"),
        ] {
            let vars: HashMap<String, String> =
                [(name.to_string(), value.to_string())].into_iter().collect();
            assert!(
                Config::from_vars(&vars).is_err(),
                "{name}={value} should be rejected"
            );
        }
    }
}
