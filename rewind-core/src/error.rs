use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Invalid rollback request: {0}")]
    Validation(String),

    #[error("Not a git work tree: {0}")]
    NotARepository(PathBuf),

    #[error("Rollback blocked: {}", reasons.join("; "))]
    Blocked { reasons: Vec<String> },

    #[error("git {command} failed: {message}")]
    GitCommand { command: String, message: String },

    #[error("Revert conflicts in: {}", files.join(", "))]
    Conflict { files: Vec<String> },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("A rollback is already running for {0}")]
    Busy(PathBuf),

    #[error("Rollback cancelled before any change was made")]
    Cancelled,
}

impl Error {
    /// Stable machine-readable name used by the HTTP layer.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Io(_) => "io",
            Error::Serialization(_) => "serialization",
            Error::Config(_) => "config",
            Error::Validation(_) => "validation",
            Error::NotARepository(_) => "not_a_repository",
            Error::Blocked { .. } => "blocked",
            Error::GitCommand { .. } => "git_command",
            Error::Conflict { .. } => "conflict",
            Error::NotFound(_) => "not_found",
            Error::Busy(_) => "busy",
            Error::Cancelled => "cancelled",
        }
    }

    pub(crate) fn git(command: impl Into<String>, message: impl Into<String>) -> Self {
        Error::GitCommand {
            command: command.into(),
            message: message.into(),
        }
    }
}
