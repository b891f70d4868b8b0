//! Access decision for pages that need a signed-in citizen

use serde::{Deserialize, Serialize};

use crate::session::SessionView;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteAccess {
    /// Bootstrap still running; show a loading screen
    Pending,
    RedirectToLogin,
    Granted,
}

impl RouteAccess {
    pub fn for_view(view: &SessionView) -> Self {
        if view.is_loading {
            RouteAccess::Pending
        } else if view.is_authenticated {
            RouteAccess::Granted
        } else {
            RouteAccess::RedirectToLogin
        }
    }
}
