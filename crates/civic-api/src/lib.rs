//! CivicCare API client
//!
//! Models, error taxonomy and the HTTP collaborator used by the session
//! layer. Only the authentication and profile endpoints live here;
//! everything else the backend serves is outside the client session's
//! concern.

mod client;
mod config;
mod error;
mod profile;
pub mod validate;

pub use client::{AuthApi, HttpAuthApi};
pub use config::ApiConfig;
pub use error::ApiError;
pub use profile::{Document, LoginRequest, LoginResponse, ProfileUpdate, Registration, UserProfile};

pub type Result<T> = std::result::Result<T, ApiError>;
