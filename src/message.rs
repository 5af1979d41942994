// src/message.rs
// The game protocol. Every message is an `Envelope`: sender metadata, an
// optional recipient, and a `Message` tagged by `kind` on the wire.

use serde::{Deserialize, Serialize};

use crate::card::Card;
use crate::defs::Number;
use crate::error::BingoResult;
use crate::game::GameState;
use crate::identity::Identity;
use crate::prize::Prize;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Message {
    HostOffer {
        server_state: GameState,
    },
    HostReject {
        server_state: GameState,
    },
    Connected,
    ConnectionAcknowledged {
        server_state: GameState,
    },
    GameAlreadyStarted {
        server_state: GameState,
    },
    NewGame {
        server_state: GameState,
    },
    BingoCardIssued {
        server_state: GameState,
        card: Card,
    },
    BingoCallerMessage {
        server_state: GameState,
        text: String,
        number: Number,
    },
    GameInfo {
        server_state: GameState,
    },
    PrizeAwarded {
        server_state: GameState,
        prize: Prize,
        player: Identity,
    },
    GameComplete {
        server_state: GameState,
        reason: String,
        winner: Option<Identity>,
    },
    Bingo {
        #[serde(default)]
        numbers: Vec<Number>,
    },
    /// Any kind this build does not know about. Always a no-op.
    #[serde(other)]
    Unknown,
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::HostOffer { .. } => "host-offer",
            Message::HostReject { .. } => "host-reject",
            Message::Connected => "connected",
            Message::ConnectionAcknowledged { .. } => "connection-acknowledged",
            Message::GameAlreadyStarted { .. } => "game-already-started",
            Message::NewGame { .. } => "new-game",
            Message::BingoCardIssued { .. } => "bingo-card-issued",
            Message::BingoCallerMessage { .. } => "bingo-caller-message",
            Message::GameInfo { .. } => "game-info",
            Message::PrizeAwarded { .. } => "prize-awarded",
            Message::GameComplete { .. } => "game-complete",
            Message::Bingo { .. } => "bingo",
            Message::Unknown => "unknown",
        }
    }

    /// The host's state snapshot carried by this message, if any
    pub fn server_state(&self) -> Option<&GameState> {
        match self {
            Message::HostOffer { server_state }
            | Message::HostReject { server_state }
            | Message::ConnectionAcknowledged { server_state }
            | Message::GameAlreadyStarted { server_state }
            | Message::NewGame { server_state }
            | Message::BingoCardIssued { server_state, .. }
            | Message::BingoCallerMessage { server_state, .. }
            | Message::GameInfo { server_state }
            | Message::PrizeAwarded { server_state, .. }
            | Message::GameComplete { server_state, .. } => Some(server_state),
            Message::Connected | Message::Bingo { .. } | Message::Unknown => None,
        }
    }
}

/// Sender details attached by the channel layer to everything it sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub client_id: String,
    pub friendly_name: String,
    pub game_id: String,
}

impl Metadata {
    pub fn new(identity: &Identity, game_id: &str) -> Self {
        Self {
            client_id: identity.client_id.clone(),
            friendly_name: identity.friendly_name.clone(),
            game_id: game_id.to_string(),
        }
    }

    pub fn identity(&self) -> Identity {
        Identity::with_id(&self.client_id, &self.friendly_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub for_client_id: Option<String>,
    #[serde(flatten)]
    pub message: Message,
}

impl Envelope {
    pub fn new(metadata: Metadata, message: Message, for_client_id: Option<&str>) -> Self {
        Self {
            metadata,
            for_client_id: for_client_id.map(str::to_string),
            message,
        }
    }

    pub fn sender_id(&self) -> &str {
        &self.metadata.client_id
    }

    pub fn to_json(&self) -> BingoResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> BingoResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Recipient filter: untargeted messages are for everyone, targeted ones
    /// only for the subscriber whose id matches.
    pub fn is_for(&self, client_id: &str) -> bool {
        match &self.for_client_id {
            None => true,
            Some(target) => target == client_id,
        }
    }
}
