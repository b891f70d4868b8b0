//! CivicCare Storage Layer
//!
//! SQLite-backed key-value persistence shared by every open context
//! (browser tab or window) of the client. Writes made through one context
//! are announced to listeners registered by the others.

mod database;
mod error;
mod migrations;
mod store;

pub use database::Database;
pub use error::StorageError;
pub use store::{KeyValueStore, Listener, SharedStore, StoreContext, StoreEvent, Subscription};

pub type Result<T> = std::result::Result<T, StorageError>;
