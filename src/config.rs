// src/config.rs
// Session configuration loaded from a `key = value` file.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{BingoError, BingoResult};
use crate::game::generate_game_id;
use crate::logging::{log_info, log_warning};

pub const DEFAULT_CONFIG_PATH: &str = "conf/session.conf";

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub name: String,
    pub game_id: Option<String>,
    pub call_interval_ms: u64,
    pub discovery_timeout_secs: u64,
    pub claim_debounce_ms: u64,
    pub automark: bool,
    pub players: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: "Player".to_string(),
            game_id: None,
            call_interval_ms: 5000,
            discovery_timeout_secs: 10,
            claim_debounce_ms: 5000,
            automark: false,
            players: 3,
        }
    }
}

impl SessionConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> BingoResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> BingoResult<Self> {
        let config_map = parse_config(content);
        let defaults = Self::default();

        let name = config_map.get("name").cloned().unwrap_or(defaults.name);
        let game_id = config_map.get("game_id").filter(|id| !id.is_empty()).cloned();
        let call_interval_ms = parse_value(&config_map, "call_interval_ms")?.unwrap_or(defaults.call_interval_ms);
        let discovery_timeout_secs =
            parse_value(&config_map, "discovery_timeout_secs")?.unwrap_or(defaults.discovery_timeout_secs);
        let claim_debounce_ms = parse_value(&config_map, "claim_debounce_ms")?.unwrap_or(defaults.claim_debounce_ms);
        let automark = parse_value(&config_map, "automark")?.unwrap_or(defaults.automark);
        let players = parse_value(&config_map, "players")?.unwrap_or(defaults.players);

        Ok(SessionConfig {
            name,
            game_id,
            call_interval_ms,
            discovery_timeout_secs,
            claim_debounce_ms,
            automark,
            players,
        })
    }

    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::from_file(path) {
            Ok(config) => {
                log_info(&format!("Loaded session configuration from {}", path.display()));
                config
            }
            Err(e) => {
                log_warning(&format!(
                    "Could not load session config from {}: {}. Using defaults.",
                    path.display(),
                    e
                ));
                Self::default()
            }
        }
    }

    /// The configured game id, or a freshly generated one
    pub fn game_id_or_generate(&self) -> String {
        self.game_id.clone().unwrap_or_else(generate_game_id)
    }

    pub fn call_interval(&self) -> Duration {
        Duration::from_millis(self.call_interval_ms)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs)
    }

    pub fn claim_debounce(&self) -> Duration {
        Duration::from_millis(self.claim_debounce_ms)
    }
}

fn parse_value<T: std::str::FromStr>(config: &HashMap<String, String>, key: &str) -> BingoResult<Option<T>> {
    match config.get(key) {
        None => Ok(None),
        Some(raw) => raw.parse::<T>().map(Some).map_err(|_| BingoError::Config {
            message: format!("invalid value for {key}: {raw}"),
        }),
    }
}

fn parse_config(content: &str) -> HashMap<String, String> {
    let mut config = HashMap::new();

    for line in content.lines() {
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some((key, value)) = line.split_once('=') {
            config.insert(key.trim().to_string(), value.trim().to_string());
        }
    }

    config
}
