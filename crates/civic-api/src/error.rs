//! API error types

use serde_json::Value;
use thiserror::Error;

/// Marker the backend and older clients use for rejected credentials.
const UNAUTHORIZED_SIGNAL: &str = "Unauthorized";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Input rejected before or by the server; never a session fault
    #[error("Validation errors: {0}")]
    Validation(String),

    /// Credential rejected, not worth retrying
    #[error("Authorization failed (HTTP {status}): {message}")]
    Auth { status: u16, message: String },

    /// Network, timeout or server trouble
    #[error("{message}")]
    Transient {
        status: Option<u16>,
        message: String,
    },
}

impl ApiError {
    pub fn transient(message: impl Into<String>) -> Self {
        ApiError::Transient {
            status: None,
            message: message.into(),
        }
    }

    pub fn is_authorization(&self) -> bool {
        match self {
            ApiError::Auth { .. } => true,
            ApiError::Transient { message, .. } | ApiError::Validation(message) => {
                message.contains(UNAUTHORIZED_SIGNAL)
            }
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Transient { .. }) && !self.is_authorization()
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Auth { status, .. } => Some(*status),
            ApiError::Transient { status, .. } => *status,
            ApiError::Validation(_) => Some(400),
        }
    }

    /// Classify a non-success response from its status and JSON body.
    ///
    /// `body` is `Value::Null` when the response carried no JSON.
    pub fn from_response(status: u16, reason: &str, body: &Value) -> Self {
        if status == 400 {
            if let Some(fields) = field_errors(body) {
                return ApiError::Validation(fields);
            }
        }

        let message = body
            .get("message")
            .or_else(|| body.get("detail"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {}: {}", status, reason));

        match status {
            401 | 403 => ApiError::Auth { status, message },
            400 => ApiError::Validation(message),
            _ => ApiError::Transient {
                status: Some(status),
                message,
            },
        }
    }
}

/// Flatten `{"field": ["a", "b"], "other": "c"}` into `field: a, b; other: c`.
fn field_errors(body: &Value) -> Option<String> {
    let object = body.as_object()?;

    let messages: Vec<String> = object
        .iter()
        .filter_map(|(field, errors)| match errors {
            Value::Array(items) => {
                let joined = items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                Some(format!("{}: {}", field, joined))
            }
            Value::String(s) => Some(format!("{}: {}", field, s)),
            _ => None,
        })
        .collect();

    if messages.is_empty() {
        None
    } else {
        Some(messages.join("; "))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        let status = err.status().map(|s| s.as_u16());

        let message = if err.is_connect() {
            "Network error: Unable to connect to server".to_string()
        } else if err.is_timeout() {
            "Network error: request timed out".to_string()
        } else if err.is_decode() {
            format!("Malformed response body: {}", err)
        } else {
            err.to_string()
        };

        match status {
            Some(code @ (401 | 403)) => ApiError::Auth {
                status: code,
                message,
            },
            _ => ApiError::Transient { status, message },
        }
    }
}
