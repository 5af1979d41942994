// src/error.rs
// Error type shared by the channel layer and configuration loading.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BingoError {
    #[error("Client is not connected to a game channel")]
    NotConnected,

    #[error("Message serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type BingoResult<T> = Result<T, BingoError>;
