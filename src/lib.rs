use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConciergeError>;

#[derive(Error, Debug)]
pub enum ConciergeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Completion error: {0}")]
    Completion(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<config::ConfigError> for ConciergeError {
    fn from(err: config::ConfigError) -> Self {
        ConciergeError::Config(err.to_string())
    }
}

pub mod chat;
pub mod commands;
pub mod completion;
pub mod config;
pub mod context;
pub mod retrieval;
pub mod session;
pub mod storage;
pub mod ui;
