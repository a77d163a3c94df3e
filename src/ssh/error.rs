// ABOUTME: SSH-specific error types.
// ABOUTME: Covers connection, authentication, host key and channel failures.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("connection to {0} timed out")]
    ConnectTimeout(String),

    #[error("authentication failed as {0}: no valid credentials")]
    AuthenticationFailed(String),

    #[error("no usable authentication method: {0}")]
    NoAuthMethod(String),

    #[error("SSH agent not available: {0}")]
    AgentUnavailable(String),

    #[error("failed to load key from {path}: {reason}")]
    KeyLoadFailed { path: PathBuf, reason: String },

    #[error("host key for {0} does not match the trusted key")]
    HostKeyMismatch(String),

    #[error("trust store {path}: {reason}")]
    TrustStore { path: PathBuf, reason: String },

    #[error("{0} request rejected by remote host")]
    RequestRejected(&'static str),

    #[error("channel closed unexpectedly without exit status")]
    ChannelClosed,

    #[error("SSH protocol error: {0}")]
    Protocol(#[from] russh::Error),

    #[error("SSH key error: {0}")]
    Key(#[from] russh::keys::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
