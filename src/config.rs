//! Engine configuration
//!
//! Node-level settings are loaded once at startup from a JSON file.
//! Session-level settings (`default_tablespace`, `temp_tablespaces`, ...)
//! live in [`crate::session::SessionSettings`].

use crate::types::{ContentId, NodeRole, COORDINATOR_CONTENT_ID};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    /// Debug level
    Debug,
    /// Info level
    Info,
    /// Warn level
    Warn,
    /// Error level
    Error,
}

impl LogLevel {
    pub fn to_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Data directory path
    pub data_dir: PathBuf,
    /// Node identifier embedded in tablespace version directories
    pub node_id: u32,
    /// Partition identity; -1 on the coordinator
    pub content_id: ContentId,
    /// Role of this node
    pub node_role: NodeRole,
    /// Number of primary partitions in the cluster
    pub segment_count: u32,
    /// Upper bound on blocking lock waits, in milliseconds
    pub lock_timeout_ms: Option<u64>,
    /// Log level
    pub log_level: LogLevel,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            node_id: 1,
            content_id: COORDINATOR_CONTENT_ID,
            node_role: NodeRole::Utility,
            segment_count: 0,
            lock_timeout_ms: None,
            log_level: LogLevel::Info,
        }
    }
}

impl EngineConfig {
    /// Configuration for a stand-alone node rooted at `data_dir`
    pub fn utility(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Configuration for a coordinator over `segment_count` workers
    pub fn coordinator(data_dir: impl AsRef<Path>, node_id: u32, segment_count: u32) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            node_id,
            content_id: COORDINATOR_CONTENT_ID,
            node_role: NodeRole::Coordinator,
            segment_count,
            ..Self::default()
        }
    }

    /// Configuration for the worker holding partition `content_id`
    pub fn worker(data_dir: impl AsRef<Path>, node_id: u32, content_id: ContentId) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            node_id,
            content_id,
            node_role: NodeRole::Worker,
            ..Self::default()
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout_ms.map(Duration::from_millis)
    }

    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Check cross-field consistency
    pub fn validate(&self) -> ConfigResult<()> {
        match self.node_role {
            NodeRole::Coordinator if self.content_id != COORDINATOR_CONTENT_ID => {
                Err(ConfigError::Invalid(format!(
                    "coordinator must use content id {}, got {}",
                    COORDINATOR_CONTENT_ID, self.content_id
                )))
            }
            NodeRole::Worker if self.content_id < 0 => Err(ConfigError::Invalid(format!(
                "worker content id must be non-negative, got {}",
                self.content_id
            ))),
            _ if self.data_dir.as_os_str().is_empty() => {
                Err(ConfigError::Invalid("data_dir must be set".to_string()))
            }
            _ => Ok(()),
        }
    }
}

/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    /// Config file could not be read
    IoError(std::io::Error),
    /// Config file is not valid JSON for [`EngineConfig`]
    ParseError(serde_json::Error),
    /// Settings are inconsistent
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(err) => write!(f, "I/O error: {}", err),
            ConfigError::ParseError(err) => write!(f, "Parse error: {}", err),
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError(err) => Some(err),
            ConfigError::ParseError(err) => Some(err),
            ConfigError::Invalid(_) => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::ParseError(err)
    }
}

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;
