// ABOUTME: End-to-end tests of the russh transport against an in-process SSH server.
// ABOUTME: Covers TOFU learning, auth failures, PTY, exit status relay and key mismatch.

mod support;

use async_trait::async_trait;
use jumplist::config::Endpoint;
use jumplist::session::{
    AgentStreamBox, Closers, Identity, InboundSession, ProxyErrorKind, SessionProxy,
};
use jumplist::ssh::{
    self, AuthMethod, AuthResolver, AuthStrategy, HostKeyVerifier, KeyFileStrategy,
    RusshTransport, TransportConfig,
};
use russh::keys::agent::client::AgentClient;
use russh::keys::ssh_key;
use russh::server::{self, Auth, Msg, Session};
use russh::{Channel, ChannelId, CryptoVec, Pty};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use support::drain;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// Remote host whose shell prints a line and exits with status 3.
#[derive(Default)]
struct RemoteShell {
    pty: Option<(String, u32, u32)>,
}

impl server::Handler for RemoteShell {
    type Error = russh::Error;

    async fn auth_publickey(
        &mut self,
        user: &str,
        _public_key: &ssh_key::PublicKey,
    ) -> Result<Auth, Self::Error> {
        if user == "alice" {
            Ok(Auth::Accept)
        } else {
            Ok(Auth::reject())
        }
    }

    async fn channel_open_session(
        &mut self,
        _channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
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
        self.pty = Some((term.to_string(), col_width, row_height));
        session.channel_success(channel)?;
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        session.channel_success(channel)?;
        let (term, cols, rows) = self.pty.clone().unwrap_or_default();
        let banner = format!("{} {}x{}\r\n", term, cols, rows);
        session.data(channel, CryptoVec::from_slice(banner.as_bytes()))?;
        session.exit_status_request(channel, 3)?;
        session.eof(channel)?;
        session.close(channel)?;
        Ok(())
    }
}

async fn start_remote() -> SocketAddr {
    start_tracked_remote().await.0
}

/// Like [`start_remote`], also reporting each connection that ends.
async fn start_tracked_remote() -> (SocketAddr, mpsc::UnboundedReceiver<()>) {
    let (ended_tx, ended_rx) = mpsc::unbounded_channel();
    let config = Arc::new(server::Config {
        keys: vec![support::private_key()],
        auth_rejection_time: Duration::from_millis(10),
        auth_rejection_time_initial: Some(Duration::from_millis(0)),
        ..Default::default()
    });
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let config = Arc::clone(&config);
            let ended = ended_tx.clone();
            tokio::spawn(async move {
                if let Ok(running) =
                    server::run_stream(config, stream, RemoteShell::default()).await
                {
                    let _ = running.await;
                }
                let _ = ended.send(());
            });
        }
    });

    (addr, ended_rx)
}

fn proxy(dir: &Path) -> SessionProxy {
    let key_path = dir.join("id_ed25519");
    std::fs::write(&key_path, support::PRIVATE_KEY_A).unwrap();
    proxy_with(dir, Box::new(KeyFileStrategy::new(vec![key_path])))
}

fn proxy_with(dir: &Path, auth: Box<dyn AuthStrategy>) -> SessionProxy {
    SessionProxy::new(
        Arc::new(RusshTransport::new(TransportConfig {
            connect_timeout: Duration::from_secs(5),
            keepalive_interval: Duration::from_secs(30),
        })),
        AuthResolver::new(vec![auth]),
        HostKeyVerifier::new(dir.join("known_hosts")),
    )
}

/// Offers an agent whose socket is already closed, so listing keys fails.
struct DeadAgent;

#[async_trait]
impl AuthStrategy for DeadAgent {
    fn name(&self) -> &'static str {
        "dead agent"
    }

    async fn probe(
        &self,
        _inbound: &InboundSession,
        _closers: &mut Closers,
    ) -> ssh::Result<Option<AuthMethod>> {
        let (stream, agent_side) = tokio::io::duplex(64);
        drop(agent_side);
        let stream: AgentStreamBox = Box::new(stream);
        Ok(Some(AuthMethod::Agent {
            client: AgentClient::connect(stream),
            source: "dead agent",
        }))
    }
}

fn endpoint(addr: SocketAddr) -> Endpoint {
    Endpoint::parse(&format!("{}:{}", addr.ip(), addr.port())).unwrap()
}

#[tokio::test]
async fn proxies_shell_and_learns_host_key() {
    support::init_tracing();
    let addr = start_remote().await;
    let dir = tempfile::tempdir().unwrap();
    let proxy = proxy(dir.path());

    let (mut inbound, mut frames) = InboundSession::new(Identity::new("alice", None));
    let empty: &[u8] = b"";
    let status = proxy
        .serve(&endpoint(addr), &mut inbound, empty)
        .await
        .unwrap();

    assert_eq!(status, 3);
    let received = drain(&mut frames);
    assert_eq!(received.exit, Some(3));
    assert!(received.stdout_text().contains("xterm-256color 80x24\r\n"));

    let known_hosts = std::fs::read_to_string(dir.path().join("known_hosts")).unwrap();
    assert!(known_hosts.starts_with(&format!("[127.0.0.1]:{} {}", addr.port(), support::KEY_A)));
}

#[tokio::test]
async fn rejected_user_fails_session_creation() {
    let addr = start_remote().await;
    let dir = tempfile::tempdir().unwrap();
    let proxy = proxy(dir.path());

    let (mut inbound, _frames) = InboundSession::new(Identity::new("mallory", None));
    let empty: &[u8] = b"";
    let err = proxy
        .connect(&endpoint(addr), &mut inbound, empty)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ProxyErrorKind::SessionCreation);
    assert!(matches!(
        err.ssh_error(),
        ssh::Error::AuthenticationFailed(user) if user == "mallory"
    ));
}

#[tokio::test]
async fn changed_host_key_is_refused() {
    let addr = start_remote().await;
    let dir = tempfile::tempdir().unwrap();
    let known_hosts = dir.path().join("known_hosts");
    let pinned = format!("[127.0.0.1]:{} {}\n", addr.port(), support::KEY_B);
    std::fs::write(&known_hosts, &pinned).unwrap();
    let proxy = proxy(dir.path());

    let (mut inbound, _frames) = InboundSession::new(Identity::new("alice", None));
    let empty: &[u8] = b"";
    let err = proxy
        .connect(&endpoint(addr), &mut inbound, empty)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ProxyErrorKind::SessionCreation);
    assert!(matches!(err.ssh_error(), ssh::Error::HostKeyMismatch(_)));
    assert_eq!(std::fs::read_to_string(&known_hosts).unwrap(), pinned);
}

#[tokio::test]
async fn auth_error_reports_cause_and_ends_connection() {
    let (addr, mut ended) = start_tracked_remote().await;
    let dir = tempfile::tempdir().unwrap();
    let proxy = proxy_with(dir.path(), Box::new(DeadAgent));

    let (mut inbound, _frames) = InboundSession::new(Identity::new("alice", None));
    let empty: &[u8] = b"";
    let err = proxy
        .connect(&endpoint(addr), &mut inbound, empty)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ProxyErrorKind::SessionCreation);
    assert!(matches!(err.ssh_error(), ssh::Error::AgentUnavailable(_)));
    tokio::time::timeout(Duration::from_secs(5), ended.recv())
        .await
        .expect("remote connection should end")
        .unwrap();
}
