//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Storage error: {0}")]
    Storage(#[from] civic_storage::StorageError),

    #[error("API error: {0}")]
    Api(#[from] civic_api::ApiError),

    #[error("Session error: {0}")]
    Session(#[from] civic_session::SessionError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not signed in")]
    NotSignedIn,
}
