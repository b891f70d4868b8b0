//! CivicCare Session Management
//!
//! - One `SessionManager` per open context (tab or window), injected by
//!   reference into whatever renders the UI
//! - Cached identity is shown immediately, then confirmed against the
//!   backend with bounded retry
//! - Sign-out in one context signs out every other context of the origin

mod error;
mod guard;
mod manager;
mod reconcile;
mod session;

pub use error::SessionError;
pub use guard::RouteAccess;
pub use manager::{SessionManager, TOKEN_KEY, USER_KEY};
pub use reconcile::{
    cancel_pair, reconcile, CancelHandle, CancelSignal, ReconcileOutcome, RetryPolicy,
};
pub use session::{Session, SessionStatus, SessionView};

pub type Result<T> = std::result::Result<T, SessionError>;
