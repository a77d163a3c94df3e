// ABOUTME: Inbound side of a proxied session as seen by the proxy core.
// ABOUTME: Identity, PTY, ordered output frames, resize events, forwarded agent.

use super::closers::Closers;
use crate::ssh;
use async_trait::async_trait;
use bytes::Bytes;
use russh::keys::agent::client::AgentStream;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowSize {
    pub cols: u32,
    pub rows: u32,
}

impl WindowSize {
    pub fn new(cols: u32, rows: u32) -> Self {
        Self { cols, rows }
    }

    /// Zero by zero never describes a real terminal; transports report it
    /// once the inbound session is gone.
    pub fn is_zero(&self) -> bool {
        self.cols == 0 && self.rows == 0
    }
}

/// Event on the inbound session's resize sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowEvent {
    Resize(WindowSize),
    /// The inbound session ended; no further resizes will follow.
    Closed,
}

impl WindowEvent {
    pub fn from_size(size: WindowSize) -> Self {
        if size.is_zero() {
            WindowEvent::Closed
        } else {
            WindowEvent::Resize(size)
        }
    }
}

/// PTY parameters requested by the inbound client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtyInfo {
    pub term: String,
    pub size: WindowSize,
}

impl Default for PtyInfo {
    fn default() -> Self {
        Self {
            term: "xterm-256color".to_string(),
            size: WindowSize::new(80, 24),
        }
    }
}

/// Who is on the other end of the inbound session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user: String,
    pub remote_addr: Option<SocketAddr>,
}

impl Identity {
    pub fn new(user: impl Into<String>, remote_addr: Option<SocketAddr>) -> Self {
        Self {
            user: user.into(),
            remote_addr,
        }
    }
}

/// Output delivered back to the inbound client, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Stdout(Bytes),
    Stderr(Bytes),
    /// Terminate the inbound session with this status. Always the last frame.
    Exit(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputStream {
    Stdout,
    Stderr,
}

/// Writer onto one of the inbound session's output streams.
///
/// Every write becomes one frame on a shared queue, so stdout, stderr and the
/// final exit status reach the client in the order they were produced.
#[derive(Debug, Clone)]
pub struct OutputSink {
    tx: mpsc::UnboundedSender<InboundFrame>,
    stream: OutputStream,
}

impl AsyncWrite for OutputSink {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let chunk = Bytes::copy_from_slice(buf);
        let frame = match self.stream {
            OutputStream::Stdout => InboundFrame::Stdout(chunk),
            OutputStream::Stderr => InboundFrame::Stderr(chunk),
        };
        match self.tx.send(frame) {
            Ok(()) => Poll::Ready(Ok(buf.len())),
            Err(_) => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "inbound session closed",
            ))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Byte stream to an SSH agent.
pub type AgentStreamBox = Box<dyn AgentStream + Send + Unpin>;

/// Opens agent connections forwarded by the inbound client.
#[async_trait]
pub trait AgentForwarder: Send + Sync {
    /// Open a new agent stream. Anything that must be released afterwards is
    /// registered on `closers`, including when this call fails part way.
    async fn open(&self, closers: &mut Closers) -> ssh::Result<AgentStreamBox>;
}

/// The already-authenticated session that initiated the proxy.
pub struct InboundSession {
    identity: Identity,
    pty: Option<PtyInfo>,
    frames: mpsc::UnboundedSender<InboundFrame>,
    window_events: Option<mpsc::UnboundedReceiver<WindowEvent>>,
    agent: Option<Arc<dyn AgentForwarder>>,
}

impl std::fmt::Debug for InboundSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundSession")
            .field("identity", &self.identity)
            .field("pty", &self.pty)
            .field("agent_forwarding", &self.agent.is_some())
            .finish()
    }
}

impl InboundSession {
    /// Create a session and the receiving end of its output frames.
    pub fn new(identity: Identity) -> (Self, mpsc::UnboundedReceiver<InboundFrame>) {
        let (frames, rx) = mpsc::unbounded_channel();
        let session = Self {
            identity,
            pty: None,
            frames,
            window_events: None,
            agent: None,
        };
        (session, rx)
    }

    pub fn with_pty(mut self, pty: PtyInfo) -> Self {
        self.pty = Some(pty);
        self
    }

    pub fn with_window_events(mut self, events: mpsc::UnboundedReceiver<WindowEvent>) -> Self {
        self.window_events = Some(events);
        self
    }

    pub fn with_agent(mut self, agent: Arc<dyn AgentForwarder>) -> Self {
        self.agent = Some(agent);
        self
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn user(&self) -> &str {
        &self.identity.user
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.identity.remote_addr
    }

    pub fn pty(&self) -> Option<&PtyInfo> {
        self.pty.as_ref()
    }

    pub fn agent(&self) -> Option<&Arc<dyn AgentForwarder>> {
        self.agent.as_ref()
    }

    pub fn stdout(&self) -> OutputSink {
        OutputSink {
            tx: self.frames.clone(),
            stream: OutputStream::Stdout,
        }
    }

    pub fn stderr(&self) -> OutputSink {
        OutputSink {
            tx: self.frames.clone(),
            stream: OutputStream::Stderr,
        }
    }

    /// Take the resize event sequence. Only the first caller gets it.
    pub fn take_window_events(&mut self) -> Option<mpsc::UnboundedReceiver<WindowEvent>> {
        self.window_events.take()
    }

    /// PTY parameters at the current window size.
    ///
    /// Resizes already queued are consumed into the result, so only later
    /// ones remain on the event sequence. The flag is false once a queued
    /// event reports that the inbound session is gone.
    pub fn current_pty(&mut self) -> (PtyInfo, bool) {
        let mut pty = self.pty.clone().unwrap_or_default();
        let Some(events) = self.window_events.as_mut() else {
            return (pty, true);
        };

        while let Ok(event) = events.try_recv() {
            match event {
                WindowEvent::Resize(size) if !size.is_zero() => pty.size = size,
                _ => return (pty, false),
            }
        }
        self.pty = Some(pty.clone());
        (pty, true)
    }

    /// Terminate the inbound session with `status`.
    pub fn exit(&self, status: u32) {
        if self.frames.send(InboundFrame::Exit(status)).is_err() {
            tracing::debug!("inbound session already closed before exit {}", status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn zero_size_means_closed() {
        assert_eq!(
            WindowEvent::from_size(WindowSize::new(0, 0)),
            WindowEvent::Closed
        );
        assert_eq!(
            WindowEvent::from_size(WindowSize::new(0, 24)),
            WindowEvent::Resize(WindowSize::new(0, 24))
        );
    }

    #[tokio::test]
    async fn output_frames_keep_write_order() {
        let (session, mut rx) = InboundSession::new(Identity::new("alice", None));
        let mut out = session.stdout();
        let mut err = session.stderr();

        out.write_all(b"one").await.unwrap();
        err.write_all(b"two").await.unwrap();
        out.write_all(b"three").await.unwrap();
        session.exit(0);

        assert_eq!(rx.recv().await, Some(InboundFrame::Stdout(Bytes::from("one"))));
        assert_eq!(rx.recv().await, Some(InboundFrame::Stderr(Bytes::from("two"))));
        assert_eq!(rx.recv().await, Some(InboundFrame::Stdout(Bytes::from("three"))));
        assert_eq!(rx.recv().await, Some(InboundFrame::Exit(0)));
    }

    #[test]
    fn current_pty_takes_latest_queued_size() {
        let (session, _rx) = InboundSession::new(Identity::new("alice", None));
        let (tx, events) = mpsc::unbounded_channel();
        let mut session = session
            .with_pty(PtyInfo {
                term: "vt100".to_string(),
                size: WindowSize::new(80, 24),
            })
            .with_window_events(events);

        for cols in 81..=120 {
            tx.send(WindowEvent::Resize(WindowSize::new(cols, 50))).unwrap();
        }

        let (pty, open) = session.current_pty();
        assert!(open);
        assert_eq!(pty.term, "vt100");
        assert_eq!(pty.size, WindowSize::new(120, 50));

        let mut events = session.take_window_events().unwrap();
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn current_pty_notices_queued_close() {
        let (session, _rx) = InboundSession::new(Identity::new("alice", None));
        let (tx, events) = mpsc::unbounded_channel();
        let mut session = session.with_window_events(events);

        tx.send(WindowEvent::Resize(WindowSize::new(100, 30))).unwrap();
        tx.send(WindowEvent::Closed).unwrap();

        let (pty, open) = session.current_pty();
        assert!(!open);
        assert_eq!(pty.size, WindowSize::new(100, 30));
    }

    #[tokio::test]
    async fn write_after_close_is_broken_pipe() {
        let (session, rx) = InboundSession::new(Identity::new("alice", None));
        drop(rx);
        let err = session.stdout().write_all(b"late").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
