// lib.rs
// Library modules for the bingo game

pub mod defs;
pub mod error;
pub mod logging;
pub mod config;
pub mod identity;
pub mod caller;
pub mod card;
pub mod prize;
pub mod game;
pub mod message;
pub mod channel;
pub mod schedule;
pub mod server;
pub mod client;
pub mod session;
pub mod terminal;
