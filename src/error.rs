use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the seen-item store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create database file {path}: {source}")]
    CreateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Whether the database was locked by another connection
    /// (`SQLITE_BUSY` or `SQLITE_LOCKED`, including extended codes).
    pub fn is_busy(&self) -> bool {
        let StoreError::Database(sqlx::Error::Database(e)) = self else {
            return false;
        };
        e.code()
            .and_then(|code| code.parse::<i32>().ok())
            .is_some_and(|code| matches!(code & 0xff, 5 | 6))
    }
}

/// Errors raised while fetching or parsing a single feed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unable to parse feed: {0}")]
    Parse(#[from] feed_rs::parser::ParseFeedError),
}

/// Errors raised while rendering or delivering a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("invalid address '{address}': {source}")]
    Address {
        address: String,
        #[source]
        source: lettre::address::AddressError,
    },

    #[error("invalid SMTP endpoint '{0}'")]
    Endpoint(String),

    #[error("failed to build message: {0}")]
    Render(#[from] lettre::error::Error),

    #[error("failed to send message: {0}")]
    Send(#[from] lettre::transport::smtp::Error),
}

/// Errors raised while assembling the run configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings file {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("no home directory found, pass --db and --feeds explicitly")]
    NoHome,
}
