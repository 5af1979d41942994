// src/game.rs
// Authoritative game state owned by the host. It is only ever sent by value:
// every outgoing message carries its own snapshot.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::identity::Identity;
use crate::prize::Prizes;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GameStatus {
    NotStarted,
    Running,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// The host of this game
    pub server: Identity,
    pub game_id: String,
    pub automark: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub settings: Settings,
    pub status: GameStatus,
    pub players: Vec<Identity>,
    pub prizes: Prizes,
}

impl GameState {
    pub fn new(host: Identity, game_id: &str) -> Self {
        Self {
            settings: Settings {
                server: host,
                game_id: game_id.to_string(),
                automark: false,
            },
            status: GameStatus::NotStarted,
            players: Vec::new(),
            prizes: Prizes::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == GameStatus::Running
    }

    pub fn find_player(&self, client_id: &str) -> Option<&Identity> {
        self.players.iter().find(|p| p.client_id == client_id)
    }

    pub fn has_player(&self, client_id: &str) -> bool {
        self.find_player(client_id).is_some()
    }

    /// Append a player unless already present. Join order is preserved.
    pub fn add_player(&mut self, player: Identity) -> bool {
        if self.has_player(&player.client_id) {
            return false;
        }
        self.players.push(player);
        true
    }

    pub fn remove_player(&mut self, client_id: &str) -> bool {
        let before = self.players.len();
        self.players.retain(|p| p.client_id != client_id);
        self.players.len() != before
    }

    /// One-line summary for logging
    pub fn game_info(&self) -> String {
        format!(
            "Game[id={}, host={}, status={:?}, players={}, automark={}]",
            self.settings.game_id,
            self.settings.server.friendly_name,
            self.status,
            self.players.len(),
            self.settings.automark
        )
    }
}

/// Random game id in the form `game_xxxxxxxx`
pub fn generate_game_id() -> String {
    let mut rng = rand::rng();
    format!("game_{:08x}", rng.random::<u32>())
}
