// ABOUTME: Session proxy orchestration: auth, connect, PTY, resize relay, shell.
// ABOUTME: Stage-tagged errors via SNAFU; cleanup is scoped to each call.

use super::closers::Closers;
use super::inbound::{InboundSession, OutputSink};
use super::outbound::{ConnectParams, Stdio, Transport};
use super::winch::WindowChangeRelay;
use crate::config::Endpoint;
use crate::ssh::{self, AuthResolver, HostKeyVerifier};
use snafu::{ResultExt, Snafu};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

/// Written to the inbound terminal before any proxied output: leave the
/// alternate screen, reset graphic attributes, erase the display.
pub const TERMINAL_RESET: [&[u8]; 3] = [b"\x1b[?1049l", b"\x1b[0m", b"\x1b[2J"];

/// Proxy failure tagged with the stage that failed.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ProxyError {
    #[snafu(display("failed to find an auth method: {source}"))]
    AuthResolution { source: ssh::Error },

    #[snafu(display("failed to create session: {source}"))]
    SessionCreation { source: ssh::Error },

    #[snafu(display("failed to request pty: {source}"))]
    PtyRequest { source: ssh::Error },

    #[snafu(display("remote shell failed: {source}"))]
    RemoteExecution { source: ssh::Error },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyErrorKind {
    AuthResolution,
    SessionCreation,
    PtyRequest,
    RemoteExecution,
}

impl ProxyError {
    pub fn kind(&self) -> ProxyErrorKind {
        match self {
            ProxyError::AuthResolution { .. } => ProxyErrorKind::AuthResolution,
            ProxyError::SessionCreation { .. } => ProxyErrorKind::SessionCreation,
            ProxyError::PtyRequest { .. } => ProxyErrorKind::PtyRequest,
            ProxyError::RemoteExecution { .. } => ProxyErrorKind::RemoteExecution,
        }
    }

    /// The underlying SSH error.
    pub fn ssh_error(&self) -> &ssh::Error {
        match self {
            ProxyError::AuthResolution { source }
            | ProxyError::SessionCreation { source }
            | ProxyError::PtyRequest { source }
            | ProxyError::RemoteExecution { source } => source,
        }
    }
}

/// Relays inbound sessions to endpoints over an outbound transport.
pub struct SessionProxy {
    transport: Arc<dyn Transport>,
    auth: AuthResolver,
    verifier: HostKeyVerifier,
}

impl SessionProxy {
    pub fn new(transport: Arc<dyn Transport>, auth: AuthResolver, verifier: HostKeyVerifier) -> Self {
        Self {
            transport,
            auth,
            verifier,
        }
    }

    /// Proxy `inbound` to `endpoint`, feeding the remote shell from `stdin`.
    ///
    /// Returns the remote exit status. Every resource acquired along the way
    /// is released before this returns, on success and on failure.
    pub async fn connect<R>(
        &self,
        endpoint: &Endpoint,
        inbound: &mut InboundSession,
        stdin: R,
    ) -> Result<u32, ProxyError>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let mut stdout = inbound.stdout();
        reset_terminal(&mut stdout).await;

        // Declared before anything it guards so it is dropped last.
        let mut closers = Closers::new();

        let auth = self
            .auth
            .resolve(inbound, &mut closers)
            .await
            .context(AuthResolutionSnafu)?;

        let user = endpoint.effective_user(inbound.user()).to_string();
        let params = ConnectParams {
            address: endpoint.address.clone(),
            user: user.clone(),
            verifier: self.verifier.clone(),
            auth,
        };

        let mut session = self
            .transport
            .open(params, &mut closers)
            .await
            .context(SessionCreationSnafu)?;

        tracing::info!(
            user = %user,
            endpoint = %endpoint.name,
            address = %endpoint.address,
            "connected"
        );

        let (pty, inbound_open) = inbound.current_pty();
        session
            .request_pty(&pty.term, pty.size)
            .await
            .context(PtyRequestSnafu)?;

        let done = CancellationToken::new();
        let _completion = done.clone().drop_guard();

        if let Some(events) = inbound.take_window_events()
            && inbound_open
        {
            WindowChangeRelay::new(session.resizer(), events, done.clone()).spawn();
        }

        let stdio = Stdio {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            stderr: Box::new(inbound.stderr()),
        };
        let status = session.shell(stdio).await.context(RemoteExecutionSnafu)?;

        tracing::debug!(endpoint = %endpoint.name, "remote shell exited with {}", status);
        Ok(status)
    }

    /// [`SessionProxy::connect`], then end the inbound session with the
    /// outcome: the remote status, or one error line and status 1.
    pub async fn serve<R>(
        &self,
        endpoint: &Endpoint,
        inbound: &mut InboundSession,
        stdin: R,
    ) -> Result<u32, ProxyError>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let result = self.connect(endpoint, inbound, stdin).await;
        let mut out = inbound.stdout();

        match &result {
            Ok(status) => {
                let line = format!(
                    "Closed connection to \"{}\" ({})",
                    endpoint.name, endpoint.address
                );
                write_line(&mut out, &line).await;
                inbound.exit(*status);
            }
            Err(e) => {
                tracing::warn!(endpoint = %endpoint.name, kind = ?e.kind(), "{}", e);
                write_line(&mut out, &e.to_string()).await;
                inbound.exit(1);
            }
        }

        result
    }
}

async fn reset_terminal(out: &mut OutputSink) {
    for seq in TERMINAL_RESET {
        if let Err(e) = out.write_all(seq).await {
            tracing::debug!("failed to reset inbound terminal: {}", e);
            return;
        }
    }
}

async fn write_line(out: &mut OutputSink, line: &str) {
    if let Err(e) = out.write_all(format!("{}\r\n", line).as_bytes()).await {
        tracing::debug!("failed to write to inbound session: {}", e);
    }
}
