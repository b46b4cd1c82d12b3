use std::path::PathBuf;

use thiserror::Error;

/// Failures at the byte-stream seam. Only `Spawn` is reported to the
/// collaborator that requested an instance; the rest close the instance.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("failed to spawn `{command}`: {reason}")]
    Spawn { command: String, reason: String },

    #[error("stream is read-only")]
    ReadOnly,

    #[error("stream already closed")]
    Closed,

    #[error("stream i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl StreamError {
    pub fn spawn(command: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        StreamError::Spawn {
            command: command.into(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid ignore pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
