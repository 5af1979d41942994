// src/terminal.rs
// Terminal output for the bingo session: cards, calls and results.

use crossterm::style::Stylize;

use crate::card::{Card, Row};
use crate::client::Announcer;
use crate::defs::Number;
use crate::identity::Identity;
use crate::prize::Prize;

// Cells are two characters wide with one space between them
const CELL_SEPARATOR: &str = " ";

fn format_cell(cell: Option<Number>, noticed: &[Number], last_called: Option<Number>) -> String {
    match cell {
        None => "  ".to_string(),
        Some(number) if Some(number) == last_called => format!("{number:2}").green().bold().to_string(),
        Some(number) if noticed.contains(&number) => format!("{number:2}").yellow().bold().to_string(),
        Some(number) => format!("{number:2}"),
    }
}

pub fn format_row(row: &Row, noticed: &[Number], last_called: Option<Number>) -> String {
    row.iter()
        .map(|&cell| format_cell(cell, noticed, last_called))
        .collect::<Vec<_>>()
        .join(CELL_SEPARATOR)
}

/// One line per row, blocks separated by an empty line
pub fn render_card(card: &Card, noticed: &[Number], last_called: Option<Number>) -> String {
    card.blocks
        .iter()
        .map(|block| {
            block
                .rows
                .iter()
                .map(|row| format_row(row, noticed, last_called))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn print_card(owner: &Identity, card: &Card, noticed: &[Number], last_called: Option<Number>) {
    println!("\nCard {} of {}:", card.id, owner.friendly_name);
    println!("{}", render_card(card, noticed, last_called));
    println!();
}

pub fn print_prize(prize: Prize, player: &Identity) {
    let banner = match prize {
        Prize::OneLine => "ONE LINE",
        Prize::TwoLine => "TWO LINES",
        Prize::FullHouse => "FULL HOUSE!!!",
    };
    println!("\n{} for {}\n", banner.yellow().bold(), player.friendly_name);
}

pub fn print_result(reason: &str, winner: Option<&Identity>) {
    match winner {
        Some(player) => println!("\nGame over: {reason}. Winner: {}", player.friendly_name.as_str().green().bold()),
        None => println!("\nGame over: {reason}. Nobody won."),
    }
}

/// Prints announcements instead of speaking them.
pub struct TerminalAnnouncer {
    prefix: String,
}

impl TerminalAnnouncer {
    pub fn new(prefix: &str) -> Self {
        Self { prefix: prefix.to_string() }
    }
}

impl Announcer for TerminalAnnouncer {
    fn announce(&mut self, text: &str) {
        println!("📢 {}: {}", self.prefix, text);
    }
}
