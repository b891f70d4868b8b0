//! Session state machine
//!
//! ```text
//! Uninitialized
//!   ↓ token found
//! Restoring
//!   ↓ verified / rejected / retries exhausted
//! Ready ⟲ login, logout, update, other-context events
//! ```
//! `Uninitialized` may also go straight to `Ready` when no token is stored
//! or when a login lands before bootstrap.

use serde::{Deserialize, Serialize};

use civic_api::UserProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Uninitialized,
    Restoring,
    Ready,
}

impl SessionStatus {
    pub fn can_transition_to(&self, target: SessionStatus) -> bool {
        matches!(
            (self, target),
            (SessionStatus::Uninitialized, SessionStatus::Restoring)
                | (SessionStatus::Uninitialized, SessionStatus::Ready)
                | (SessionStatus::Restoring, SessionStatus::Ready)
                | (SessionStatus::Ready, SessionStatus::Ready)
        )
    }

    /// Consumers show a loading indicator until bootstrap has settled.
    pub fn is_loading(&self) -> bool {
        !matches!(self, SessionStatus::Ready)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Uninitialized => "uninitialized",
            SessionStatus::Restoring => "restoring",
            SessionStatus::Ready => "ready",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Bearer credential; `None` means signed out
    pub token: Option<String>,
    pub user: Option<UserProfile>,
    pub status: SessionStatus,
}

impl Session {
    pub fn new() -> Self {
        Self {
            token: None,
            user: None,
            status: SessionStatus::Uninitialized,
        }
    }

    /// Move to `target`, ignoring transitions the state machine forbids.
    pub fn transition(&mut self, target: SessionStatus) -> bool {
        if self.status.can_transition_to(target) {
            self.status = target;
            true
        } else {
            tracing::warn!(from = %self.status, to = %target, "Ignoring invalid session transition");
            false
        }
    }

    pub fn clear(&mut self) {
        self.token = None;
        self.user = None;
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            user: self.user.clone(),
            is_authenticated: self.is_authenticated(),
            is_loading: self.status.is_loading(),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only snapshot handed to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionView {
    pub user: Option<UserProfile>,
    pub is_authenticated: bool,
    pub is_loading: bool,
}
