// ABOUTME: Seams between the proxy core and the outbound SSH transport.
// ABOUTME: Transport opens sessions; sessions take a PTY, resize and run a shell.

use super::closers::Closers;
use super::inbound::WindowSize;
use crate::ssh::{self, AuthMethod, HostKeyVerifier};
use crate::types::HostAddress;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

/// Everything needed to open one outbound connection.
#[derive(Debug)]
pub struct ConnectParams {
    pub address: HostAddress,
    pub user: String,
    pub verifier: HostKeyVerifier,
    pub auth: AuthMethod,
}

/// Standard streams wired onto the remote shell.
pub struct Stdio {
    pub stdin: Box<dyn AsyncRead + Send + Unpin>,
    pub stdout: Box<dyn AsyncWrite + Send + Unpin>,
    pub stderr: Box<dyn AsyncWrite + Send + Unpin>,
}

/// Opens outbound connections.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect, authenticate and open an interactive session channel.
    ///
    /// Release actions for the connection are registered on `closers`.
    async fn open(
        &self,
        params: ConnectParams,
        closers: &mut Closers,
    ) -> ssh::Result<Box<dyn OutboundSession>>;
}

/// Interactive session on an outbound connection.
#[async_trait]
pub trait OutboundSession: Send {
    async fn request_pty(&mut self, term: &str, size: WindowSize) -> ssh::Result<()>;

    /// Handle for resizing the PTY while [`OutboundSession::shell`] runs.
    fn resizer(&self) -> Arc<dyn Resize>;

    /// Start the remote shell and relay `stdio` until it exits.
    /// Returns the remote exit status.
    async fn shell(&mut self, stdio: Stdio) -> ssh::Result<u32>;
}

/// Sends window-change requests to an outbound session.
#[async_trait]
pub trait Resize: Send + Sync {
    async fn window_change(&self, size: WindowSize) -> ssh::Result<()>;
}
