// src/identity.rs
// Participant identity: an opaque random id plus a display name.

use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub client_id: String,
    pub friendly_name: String,
}

impl Identity {
    pub fn new(friendly_name: &str) -> Self {
        let mut rng = rand::rng();
        Self {
            client_id: format!("{:016x}{:016x}", rng.random::<u64>(), rng.random::<u64>()),
            friendly_name: friendly_name.to_string(),
        }
    }

    /// Build an identity from an already known id (e.g. message metadata)
    pub fn with_id(client_id: &str, friendly_name: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            friendly_name: friendly_name.to_string(),
        }
    }
}

// Identities compare by id only; the display name is informational.
impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.client_id == other.client_id
    }
}

impl Eq for Identity {}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Ids come off the wire and may hold multi-byte characters
        let short: String = self.client_id.chars().take(8).collect();
        write!(f, "{} ({})", self.friendly_name, short)
    }
}
