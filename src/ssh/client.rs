// ABOUTME: Outbound SSH transport using russh.
// ABOUTME: Handles connection, host key checks, authentication and the shell relay.

use super::auth::AuthMethod;
use super::error::{Error, Result};
use super::known_hosts::HostKeyVerifier;
use crate::session::{
    Closers, ConnectParams, OutboundSession, Resize, Stdio, Transport, WindowSize,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use russh::client::{self, Config, Handle, Msg};
use russh::keys::{PrivateKeyWithHashAlg, ssh_key};
use russh::{Channel, ChannelMsg, Disconnect, Sig};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};

/// Tunables for outbound connections.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub connect_timeout: Duration,
    pub keepalive_interval: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            keepalive_interval: Duration::from_secs(30),
        }
    }
}

/// SSH client handler for russh.
pub(crate) struct SshHandler {
    host_pattern: String,
    verifier: HostKeyVerifier,
    rejection: Arc<Mutex<Option<Error>>>,
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        match self.verifier.verify(&self.host_pattern, server_public_key) {
            Ok(status) if status.is_accepted() => Ok(true),
            Ok(_) => {
                *self.rejection.lock() = Some(Error::HostKeyMismatch(self.host_pattern.clone()));
                Ok(false)
            }
            Err(e) => {
                tracing::warn!("cannot check host key for {}: {}", self.host_pattern, e);
                *self.rejection.lock() = Some(e);
                Ok(false)
            }
        }
    }
}

/// [`Transport`] that connects with russh.
pub struct RusshTransport {
    config: Arc<Config>,
    connect_timeout: Duration,
}

impl std::fmt::Debug for RusshTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RusshTransport")
            .field("connect_timeout", &self.connect_timeout)
            .field("keepalive_interval", &self.config.keepalive_interval)
            .finish()
    }
}

impl RusshTransport {
    pub fn new(config: TransportConfig) -> Self {
        let russh_config = Config {
            keepalive_interval: Some(config.keepalive_interval),
            ..Default::default()
        };
        Self {
            config: Arc::new(russh_config),
            connect_timeout: config.connect_timeout,
        }
    }

    async fn authenticate(
        session: &mut Handle<SshHandler>,
        user: &str,
        auth: AuthMethod,
    ) -> Result<bool> {
        match auth {
            AuthMethod::Agent { mut client, source } => {
                let keys = client.request_identities().await.map_err(|e| {
                    Error::AgentUnavailable(format!("failed to list {} keys: {}", source, e))
                })?;

                for key in &keys {
                    let signing: std::pin::Pin<
                        Box<dyn std::future::Future<Output = _> + Send + '_>,
                    > = Box::pin(session.authenticate_publickey_with(
                        user,
                        key.clone(),
                        None,
                        &mut client,
                    ));
                    match signing.await {
                        Ok(result) if result.success() => return Ok(true),
                        _ => continue,
                    }
                }
                Ok(false)
            }
            AuthMethod::Key(key) => {
                let hash_alg = session
                    .best_supported_rsa_hash()
                    .await
                    .map_err(Error::Protocol)?
                    .flatten();

                let result = session
                    .authenticate_publickey(user, PrivateKeyWithHashAlg::new(key, hash_alg))
                    .await
                    .map_err(Error::Protocol)?;

                Ok(result.success())
            }
        }
    }
}

#[async_trait]
impl Transport for RusshTransport {
    async fn open(
        &self,
        params: ConnectParams,
        closers: &mut Closers,
    ) -> Result<Box<dyn OutboundSession>> {
        let ConnectParams {
            address,
            user,
            verifier,
            auth,
        } = params;

        let rejection = Arc::new(Mutex::new(None));
        let handler = SshHandler {
            host_pattern: address.known_hosts_pattern(),
            verifier,
            rejection: Arc::clone(&rejection),
        };

        let connect = client::connect(
            Arc::clone(&self.config),
            (address.host(), address.port()),
            handler,
        );
        let mut session = match tokio::time::timeout(self.connect_timeout, connect).await {
            Err(_) => return Err(Error::ConnectTimeout(address.to_string())),
            Ok(Err(e)) => {
                if let Some(rejected) = rejection.lock().take() {
                    return Err(rejected);
                }
                return Err(Error::Connection(format!("{}: {}", address, e)));
            }
            Ok(Ok(session)) => session,
        };

        let method = auth.describe();
        let authenticated = Self::authenticate(&mut session, &user, auth).await;
        if !matches!(authenticated, Ok(true)) {
            if let Err(e) = session
                .disconnect(Disconnect::ByApplication, "", "en")
                .await
            {
                tracing::debug!("disconnect after failed authentication: {}", e);
            }
            return Err(authenticated
                .err()
                .unwrap_or(Error::AuthenticationFailed(user)));
        }
        tracing::debug!("authenticated to {} as {} using {}", address, user, method);

        let handle = Arc::new(session);
        let closing = Arc::clone(&handle);
        closers.push(format!("connection to {}", address), move || {
            disconnect_in_background(closing)
        });

        let channel = handle.channel_open_session().await?;
        let (resize_tx, resize_rx) = mpsc::channel(16);

        Ok(Box::new(RemoteSession {
            _handle: handle,
            channel,
            resize_tx,
            resize_rx,
        }))
    }
}

fn disconnect_in_background(handle: Arc<Handle<SshHandler>>) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        return;
    };
    runtime.spawn(async move {
        if let Err(e) = handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            tracing::debug!("disconnect failed: {}", e);
        }
    });
}

/// Interactive session channel on an outbound connection.
struct RemoteSession {
    _handle: Arc<Handle<SshHandler>>,
    channel: Channel<Msg>,
    resize_tx: mpsc::Sender<ResizeRequest>,
    resize_rx: mpsc::Receiver<ResizeRequest>,
}

/// A window size to apply, and where to report whether the remote took it.
type ResizeRequest = (WindowSize, oneshot::Sender<Result<()>>);

#[async_trait]
impl OutboundSession for RemoteSession {
    async fn request_pty(&mut self, term: &str, size: WindowSize) -> Result<()> {
        self.channel
            .request_pty(true, term, size.cols, size.rows, 0, 0, &[])
            .await?;

        loop {
            match self.channel.wait().await {
                Some(ChannelMsg::Success) => return Ok(()),
                Some(ChannelMsg::Failure) => return Err(Error::RequestRejected("pty")),
                Some(_) => {}
                None => return Err(Error::ChannelClosed),
            }
        }
    }

    fn resizer(&self) -> Arc<dyn Resize> {
        Arc::new(ChannelResizer {
            tx: self.resize_tx.clone(),
        })
    }

    async fn shell(&mut self, stdio: Stdio) -> Result<u32> {
        let Stdio {
            mut stdin,
            mut stdout,
            mut stderr,
        } = stdio;

        self.channel.request_shell(true).await?;

        let mut buf = vec![0u8; 8192];
        let mut stdin_open = true;
        let mut started = false;
        let mut exit_status = None;
        let mut got_eof = false;
        let mut resizes_open = true;

        loop {
            tokio::select! {
                read = stdin.read(&mut buf), if stdin_open => match read {
                    Ok(0) => {
                        stdin_open = false;
                        self.channel.eof().await?;
                    }
                    Ok(n) => self.channel.data(&buf[..n]).await?,
                    Err(e) => return Err(Error::Io(e)),
                },
                Some((size, reply)) = self.resize_rx.recv(), if resizes_open => {
                    let result = self
                        .channel
                        .window_change(size.cols, size.rows, 0, 0)
                        .await
                        .map_err(Error::from);
                    // The shell keeps running; only resizing stops.
                    resizes_open = result.is_ok();
                    let _ = reply.send(result);
                }
                msg = self.channel.wait() => match msg {
                    Some(ChannelMsg::Success) => started = true,
                    Some(ChannelMsg::Failure) if !started => {
                        return Err(Error::RequestRejected("shell"));
                    }
                    Some(ChannelMsg::Data { data }) => {
                        stdout.write_all(&data).await?;
                        stdout.flush().await?;
                    }
                    Some(ChannelMsg::ExtendedData { data, ext }) => {
                        if ext == 1 {
                            stderr.write_all(&data).await?;
                            stderr.flush().await?;
                        }
                    }
                    Some(ChannelMsg::ExitStatus { exit_status: status }) => {
                        exit_status = Some(status);
                        if got_eof {
                            break;
                        }
                    }
                    Some(ChannelMsg::ExitSignal { signal_name, error_message, .. }) => {
                        tracing::warn!("remote shell killed by {:?}: {}", signal_name, error_message);
                        exit_status = Some(signal_status(&signal_name));
                        if got_eof {
                            break;
                        }
                    }
                    Some(ChannelMsg::Eof) => {
                        got_eof = true;
                        if exit_status.is_some() {
                            break;
                        }
                    }
                    Some(ChannelMsg::Close) | None => break,
                    Some(_) => {}
                },
            }
        }

        exit_status.ok_or(Error::ChannelClosed)
    }
}

/// Shell convention for a process killed by a signal: 128 + signal number.
fn signal_status(signal: &Sig) -> u32 {
    let number = match signal {
        Sig::HUP => 1,
        Sig::INT => 2,
        Sig::QUIT => 3,
        Sig::ILL => 4,
        Sig::ABRT => 6,
        Sig::FPE => 8,
        Sig::KILL => 9,
        Sig::USR1 => 10,
        Sig::SEGV => 11,
        Sig::PIPE => 13,
        Sig::ALRM => 14,
        Sig::TERM => 15,
        Sig::Custom(_) => return 255,
    };
    128 + number
}

/// Hands resizes to the running shell loop and waits for the outcome.
struct ChannelResizer {
    tx: mpsc::Sender<ResizeRequest>,
}

#[async_trait]
impl Resize for ChannelResizer {
    async fn window_change(&self, size: WindowSize) -> Result<()> {
        let (reply, outcome) = oneshot::channel();
        self.tx
            .send((size, reply))
            .await
            .map_err(|_| Error::ChannelClosed)?;
        outcome.await.map_err(|_| Error::ChannelClosed)?
    }
}
