//! CivicCare Core
//!
//! Wires configuration, the shared store, the backend client and the
//! session manager into one `Client` that UI code holds by reference.

mod client;
mod config;
mod error;

pub use client::Client;
pub use config::Config;
pub use error::CoreError;

pub use civic_api::{
    validate, ApiConfig, ApiError, AuthApi, Document, HttpAuthApi, ProfileUpdate, Registration,
    UserProfile,
};
pub use civic_session::{
    RetryPolicy, RouteAccess, Session, SessionError, SessionManager, SessionStatus, SessionView,
};
pub use civic_storage::{Database, KeyValueStore, SharedStore, StorageError};

pub type Result<T> = std::result::Result<T, CoreError>;

/// Initialize logging
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).with_target(true).init();
}
