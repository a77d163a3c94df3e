// ABOUTME: Application-wide error types for jumplist.
// ABOUTME: Uses thiserror for ergonomic error handling.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("server host key not found at {0}; generate one with: ssh-keygen -t ed25519 -N '' -f {0}")]
    HostKeyMissing(PathBuf),

    #[error("SSH error: {0}")]
    Ssh(#[from] crate::ssh::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
