// ABOUTME: Per-connection russh server handler for inbound users.
// ABOUTME: Tracks PTY, resizes and agent forwarding; runs the menu and proxy on shell.

use super::{Directory, menu};
use crate::session::{
    AgentForwarder, AgentStreamBox, Closers, Identity, InboundFrame, InboundSession, PtyInfo,
    WindowEvent, WindowSize,
};
use crate::ssh;
use async_trait::async_trait;
use russh::keys::ssh_key;
use russh::server::{self, Auth, Handle, Msg, Session};
use russh::{Channel, ChannelId, CryptoVec, Pty};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;

const STDIN_BUFFER: usize = 64 * 1024;

pub(super) struct ConnectionHandler {
    directory: Arc<Directory>,
    peer_addr: Option<SocketAddr>,
    user: Option<String>,
    channel: Option<ChannelId>,
    pty: Option<PtyInfo>,
    agent_forwarding: bool,
    stdin: Option<DuplexStream>,
    window_events: Option<mpsc::UnboundedSender<WindowEvent>>,
}

impl ConnectionHandler {
    pub(super) fn new(directory: Arc<Directory>, peer_addr: Option<SocketAddr>) -> Self {
        Self {
            directory,
            peer_addr,
            user: None,
            channel: None,
            pty: None,
            agent_forwarding: false,
            stdin: None,
            window_events: None,
        }
    }

    fn is_session_channel(&self, channel: ChannelId) -> bool {
        self.channel == Some(channel)
    }

    /// The inbound side is gone: end resize forwarding and the input stream.
    fn inbound_closed(&mut self) {
        if let Some(events) = self.window_events.take() {
            let _ = events.send(WindowEvent::Closed);
        }
        self.stdin = None;
    }
}

impl server::Handler for ConnectionHandler {
    type Error = russh::Error;

    async fn auth_publickey(
        &mut self,
        user: &str,
        public_key: &ssh_key::PublicKey,
    ) -> Result<Auth, Self::Error> {
        tracing::info!(
            peer = %display_addr(self.peer_addr),
            user = %user,
            key = %public_key.fingerprint(russh::keys::HashAlg::Sha256),
            "public key authentication accepted"
        );
        self.user = Some(user.to_string());
        Ok(Auth::Accept)
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        if self.channel.is_some() {
            // One interactive session per connection.
            return Ok(false);
        }
        self.channel = Some(channel.id());
        Ok(true)
    }

    async fn pty_request(
        &mut self,
        channel: ChannelId,
        term: &str,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(Pty, u32)],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.pty = Some(PtyInfo {
            term: term.to_string(),
            size: WindowSize::new(col_width, row_height),
        });
        session.channel_success(channel)?;
        Ok(())
    }

    async fn agent_request(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        if self.is_session_channel(channel) {
            self.agent_forwarding = true;
        }
        Ok(true)
    }

    async fn window_change_request(
        &mut self,
        channel: ChannelId,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        if !self.is_session_channel(channel) {
            return Ok(());
        }

        let size = WindowSize::new(col_width, row_height);
        if let Some(pty) = self.pty.as_mut() {
            pty.size = size;
        }
        // Resizes queued while the menu is up become the outbound PTY size.
        if let Some(events) = &self.window_events
            && events.send(WindowEvent::from_size(size)).is_err()
        {
            tracing::debug!("session over, ignoring window change {}x{}", col_width, row_height);
        }
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        if !self.is_session_channel(channel) || self.stdin.is_some() {
            session.channel_failure(channel)?;
            return Ok(());
        }
        session.channel_success(channel)?;

        let user = self.user.clone().unwrap_or_default();
        let identity = Identity::new(user, self.peer_addr);
        let (inbound, frames) = InboundSession::new(identity);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut inbound = inbound.with_window_events(events_rx);
        if let Some(pty) = self.pty.clone() {
            inbound = inbound.with_pty(pty);
        }
        if self.agent_forwarding {
            inbound = inbound.with_agent(Arc::new(ForwardedAgent {
                handle: session.handle(),
            }));
        }

        let (stdin_writer, stdin_reader) = tokio::io::duplex(STDIN_BUFFER);
        self.stdin = Some(stdin_writer);
        self.window_events = Some(events_tx);

        tokio::spawn(pump_frames(session.handle(), channel, frames));

        let directory = Arc::clone(&self.directory);
        tokio::spawn(async move {
            let mut stdin = stdin_reader;
            let mut out = inbound.stdout();
            match menu::pick_endpoint(directory.endpoints(), &mut stdin, &mut out).await {
                Ok(Some(selection)) => {
                    let stdin = std::io::Cursor::new(selection.typed_ahead).chain(stdin);
                    // Outcome is reported to the user by serve.
                    let _ = directory
                        .proxy()
                        .serve(&selection.endpoint, &mut inbound, stdin)
                        .await;
                }
                Ok(None) => inbound.exit(0),
                Err(e) => {
                    tracing::debug!("menu aborted: {}", e);
                    inbound.exit(1);
                }
            }
        });

        Ok(())
    }

    async fn data(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        if !self.is_session_channel(channel) {
            return Ok(());
        }
        if let Some(stdin) = self.stdin.as_mut()
            && stdin.write_all(data).await.is_err()
        {
            self.stdin = None;
        }
        Ok(())
    }

    async fn channel_eof(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        if self.is_session_channel(channel) {
            self.stdin = None;
        }
        Ok(())
    }

    async fn channel_close(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        if self.is_session_channel(channel) {
            self.inbound_closed();
            self.channel = None;
            tracing::info!(
                peer = %display_addr(self.peer_addr),
                user = %self.user.as_deref().unwrap_or("<unknown>"),
                "session closed"
            );
        }
        Ok(())
    }
}

impl Drop for ConnectionHandler {
    fn drop(&mut self) {
        self.inbound_closed();
    }
}

/// Deliver output frames to the inbound channel in order.
async fn pump_frames(
    handle: Handle,
    channel: ChannelId,
    mut frames: mpsc::UnboundedReceiver<InboundFrame>,
) {
    while let Some(frame) = frames.recv().await {
        let sent = match frame {
            InboundFrame::Stdout(bytes) => {
                handle.data(channel, CryptoVec::from_slice(&bytes)).await.is_ok()
            }
            InboundFrame::Stderr(bytes) => handle
                .extended_data(channel, 1, CryptoVec::from_slice(&bytes))
                .await
                .is_ok(),
            InboundFrame::Exit(status) => {
                let _ = handle.exit_status_request(channel, status).await;
                let _ = handle.eof(channel).await;
                let _ = handle.close(channel).await;
                return;
            }
        };
        if !sent {
            tracing::debug!("inbound channel gone, dropping output");
            return;
        }
    }
}

/// Agent connections forwarded by the inbound client.
struct ForwardedAgent {
    handle: Handle,
}

#[async_trait]
impl AgentForwarder for ForwardedAgent {
    async fn open(&self, closers: &mut Closers) -> ssh::Result<AgentStreamBox> {
        let channel = self.handle.channel_open_agent().await?;
        let id = channel.id();
        let handle = self.handle.clone();
        closers.push("forwarded agent channel", move || {
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(async move {
                    let _ = handle.close(id).await;
                });
            }
        });
        Ok(Box::new(channel.into_stream()))
    }
}

pub(super) fn display_addr(addr: Option<SocketAddr>) -> String {
    addr.map(|a| a.to_string())
        .unwrap_or_else(|| "<unknown>".into())
}
