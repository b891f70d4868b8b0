//! API endpoint configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::error::ApiError;
use crate::Result;

pub const BASE_URL_ENV: &str = "CIVIC_API_BASE_URL";
pub const TIMEOUT_ENV: &str = "CIVIC_API_TIMEOUT_SECS";

const DEFAULT_BASE_URL: &str = "http://localhost:8000/api/";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Backend root, always ending in `/`
    pub base_url: Url,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl ApiConfig {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        })
    }

    /// Defaults overlaid with `CIVIC_API_BASE_URL` and `CIVIC_API_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var(BASE_URL_ENV).unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let mut config = Self::new(&base_url)?;

        if let Ok(raw) = std::env::var(TIMEOUT_ENV) {
            config.timeout_secs = raw.trim().parse().map_err(|_| {
                ApiError::Validation(format!("{}: not a number of seconds: {}", TIMEOUT_ENV, raw))
            })?;
        }

        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("valid default URL"),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

fn parse_base_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    // Without the trailing slash `join` would drop the last path segment
    let normalized = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/", trimmed)
    };

    Url::parse(&normalized)
        .map_err(|e| ApiError::Validation(format!("base_url: {} ({})", raw, e)))
}
