// src/prize.rs
// Prize tiers and the per-game table of who won each one.

use serde::{Deserialize, Serialize};

use crate::identity::Identity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Prize {
    OneLine,
    TwoLine,
    FullHouse,
}

impl Prize {
    pub const ALL: [Prize; 3] = [Prize::OneLine, Prize::TwoLine, Prize::FullHouse];

    /// Map the best completed-row count of a block to a prize tier.
    /// Zero completed rows earns nothing.
    pub fn from_completed_rows(rows: usize) -> Option<Prize> {
        match rows {
            0 => None,
            1 => Some(Prize::OneLine),
            2 => Some(Prize::TwoLine),
            _ => Some(Prize::FullHouse),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Prize::OneLine => "one-line",
            Prize::TwoLine => "two-line",
            Prize::FullHouse => "full-house",
        }
    }
}

impl std::fmt::Display for Prize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Winner of each prize tier, empty until awarded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prizes {
    #[serde(rename = "one-line")]
    pub one_line: Option<Identity>,
    #[serde(rename = "two-line")]
    pub two_line: Option<Identity>,
    #[serde(rename = "full-house")]
    pub full_house: Option<Identity>,
}

impl Prizes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn winner(&self, prize: Prize) -> Option<&Identity> {
        self.slot(prize).as_ref()
    }

    pub fn is_awarded(&self, prize: Prize) -> bool {
        self.winner(prize).is_some()
    }

    /// Record `player` as the winner of `prize`.
    /// Returns false, leaving the table untouched, when the tier is already taken.
    pub fn award(&mut self, prize: Prize, player: Identity) -> bool {
        let slot = self.slot_mut(prize);
        if slot.is_some() {
            return false;
        }
        *slot = Some(player);
        true
    }

    fn slot(&self, prize: Prize) -> &Option<Identity> {
        match prize {
            Prize::OneLine => &self.one_line,
            Prize::TwoLine => &self.two_line,
            Prize::FullHouse => &self.full_house,
        }
    }

    fn slot_mut(&mut self, prize: Prize) -> &mut Option<Identity> {
        match prize {
            Prize::OneLine => &mut self.one_line,
            Prize::TwoLine => &mut self.two_line,
            Prize::FullHouse => &mut self.full_house,
        }
    }
}
