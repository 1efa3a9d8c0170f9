// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration model for the parlor server.
//!
//! Deserialized from a single JSON document:
//!
//! ```json
//! {
//!   "host": "127.0.0.1", "port": 8080, "logging_level": "info",
//!   "context": { "type": "docker" },
//!   "pages": {
//!     "/sandbox": {
//!       "type": "docker",
//!       "executors": {
//!         "go": { "type": "once", "image": "alpine", "command": ["echo", "hi"] }
//!       }
//!     }
//!   }
//! }
//! ```
//!
//! The `type` keys are closed sets; an unknown variant fails at parse time.
//! The `logger_name*` keys of the original schema are accepted and unused
//! (tracing targets replace named loggers).

use std::time::Duration;

use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;

/// Configuration errors are fatal at boot.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(#[from] serde_json::Error),

    #[error("page {page:?}: {reason}")]
    InvalidPage { page: String, reason: String },

    #[error("page {page:?}: executor {executor:?}: {reason}")]
    InvalidExecutor { page: String, executor: String, reason: String },
}

/// Top-level server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub logging_level: Option<String>,
    #[serde(default)]
    pub logger_name: Option<String>,
    pub context: ContextConfig,
    /// Pages keyed by URL prefix, in declaration order.
    pub pages: IndexMap<String, PageConfig>,
}

impl ServerConfig {
    /// Parse and validate a configuration document.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (url, page) in &self.pages {
            if !url.starts_with('/') {
                return Err(ConfigError::InvalidPage {
                    page: url.clone(),
                    reason: "page URL must start with '/'".to_string(),
                });
            }
            for (name, executor) in &page.executors {
                if executor.image.is_empty() {
                    return Err(ConfigError::InvalidExecutor {
                        page: url.clone(),
                        executor: name.clone(),
                        reason: "image must not be empty".to_string(),
                    });
                }
                if executor.command.is_empty() {
                    return Err(ConfigError::InvalidExecutor {
                        page: url.clone(),
                        executor: name.clone(),
                        reason: "command must not be empty".to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Backend context configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ContextConfig {
    #[serde(rename = "type")]
    pub kind: ContextKind,
    /// Engine endpoint (`unix://...` or `tcp://host:port`). Defaults to the
    /// local Docker socket.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub logger_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextKind {
    Docker,
}

/// One page: a room variant plus its executor set.
#[derive(Debug, Clone, Deserialize)]
pub struct PageConfig {
    #[serde(rename = "type")]
    pub kind: PageKind,
    #[serde(default)]
    pub logger_name_page: Option<String>,
    #[serde(default)]
    pub logger_name_room: Option<String>,
    #[serde(default)]
    pub logger_name_room_connection: Option<String>,
    /// Executors keyed by name; declaration order is instantiation order.
    pub executors: IndexMap<String, ExecutorConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageKind {
    Docker,
}

/// One executor inside a page.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorConfig {
    #[serde(rename = "type")]
    pub kind: ExecutorKind,
    pub image: String,
    pub command: Vec<String>,
    #[serde(default)]
    pub working_directory: Option<String>,
    #[serde(default)]
    pub enable_tty: bool,
    #[serde(default)]
    pub memory_limit_bytes: Option<i64>,
    /// Fraction of one CPU; converted to a quota against the 100ms period.
    #[serde(default)]
    pub cpu_limit: Option<f64>,
    #[serde(default)]
    pub pids_limit: Option<i64>,
    /// Seconds to wait for the attached stream before rejecting a message.
    #[serde(default = "default_timeout")]
    pub handle_message_timeout: f64,
    /// Seconds to wait for the supervisor to wind down.
    #[serde(default = "default_timeout")]
    pub tear_down_timeout: f64,
    #[serde(default)]
    pub logger_name: Option<String>,
}

fn default_timeout() -> f64 {
    10.0
}

impl ExecutorConfig {
    pub fn handle_message_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.handle_message_timeout)
    }

    pub fn tear_down_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.tear_down_timeout)
    }

    /// CPU quota in microseconds per 100ms scheduling period.
    pub fn cpu_quota(&self) -> Option<i64> {
        self.cpu_limit.map(|limit| (limit * 100_000.0) as i64)
    }
}

/// The closed set of executor variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorKind {
    Once,
    Prologue,
    Epilogue,
    Always,
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
