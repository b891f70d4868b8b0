//! Client configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use civic_api::ApiConfig;
use civic_session::RetryPolicy;

use crate::error::CoreError;
use crate::Result;

pub const DATA_DIR_ENV: &str = "CIVIC_DATA_DIR";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Path to the key-value database shared by all contexts
    pub database_path: PathBuf,
    /// Backend endpoint and timeout
    pub api: ApiConfig,
    /// Bootstrap retry policy
    pub retry: RetryPolicy,
}

impl Config {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            database_path: data_dir.join("civiccare.db"),
            api: ApiConfig::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .map(|d| d.join("CivicCare"))
            .unwrap_or_else(|| PathBuf::from(".civiccare"))
    }

    /// Defaults overlaid with `CIVIC_DATA_DIR` and the API variables.
    pub fn from_env() -> Result<Self> {
        let data_dir = std::env::var(DATA_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::data_dir());

        let mut config = Self::new(data_dir);
        config.api = ApiConfig::from_env().map_err(|e| CoreError::Config(e.to_string()))?;

        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Self::data_dir())
    }
}

mod dirs {
    use std::path::PathBuf;

    pub fn data_local_dir() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            std::env::var("LOCALAPPDATA").ok().map(PathBuf::from)
        }
        #[cfg(target_os = "macos")]
        {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library/Application Support"))
        }
        #[cfg(target_os = "linux")]
        {
            std::env::var("XDG_DATA_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".local/share"))
                })
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
        {
            None
        }
    }
}
