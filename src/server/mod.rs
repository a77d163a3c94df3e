// ABOUTME: Inbound SSH server: accepts users, shows the directory, proxies sessions.
// ABOUTME: Built on russh::server with one handler per connection.

mod handler;
pub mod menu;

use crate::config::{Config, Endpoint};
use crate::error::{Error, Result};
use crate::session::SessionProxy;
use crate::ssh::{self, AuthResolver, HostKeyVerifier, RusshTransport, TransportConfig};
use handler::{ConnectionHandler, display_addr};
use russh::keys::load_secret_key;
use russh::server::{self, Server as _};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Endpoints offered to users and the proxy that reaches them.
pub struct Directory {
    endpoints: Vec<Endpoint>,
    proxy: SessionProxy,
}

impl Directory {
    pub fn new(endpoints: Vec<Endpoint>, proxy: SessionProxy) -> Self {
        Self { endpoints, proxy }
    }

    pub fn from_config(config: &Config) -> Self {
        let transport = RusshTransport::new(TransportConfig {
            connect_timeout: config.connect_timeout,
            keepalive_interval: config.keepalive_interval,
        });
        let auth = AuthResolver::from_config(config.auth.local_agent, config.key_paths());
        let verifier = HostKeyVerifier::new(config.trust_store_path());

        Self::new(
            config.endpoints.iter().cloned().collect(),
            SessionProxy::new(Arc::new(transport), auth, verifier),
        )
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn proxy(&self) -> &SessionProxy {
        &self.proxy
    }
}

struct JumpServer {
    directory: Arc<Directory>,
}

impl server::Server for JumpServer {
    type Handler = ConnectionHandler;

    fn new_client(&mut self, peer_addr: Option<SocketAddr>) -> Self::Handler {
        tracing::info!(peer = %display_addr(peer_addr), "client connected");
        ConnectionHandler::new(Arc::clone(&self.directory), peer_addr)
    }

    fn handle_session_error(&mut self, error: <Self::Handler as server::Handler>::Error) {
        tracing::warn!(?error, "session ended with error");
    }
}

/// Serve the directory on the configured address until the listener fails.
pub async fn run(config: &Config) -> Result<()> {
    let key_path = config.host_key_path();
    if !key_path.exists() {
        return Err(Error::HostKeyMissing(key_path));
    }
    let host_key = load_secret_key(&key_path, None).map_err(|e| {
        Error::Ssh(ssh::Error::KeyLoadFailed {
            path: key_path.clone(),
            reason: e.to_string(),
        })
    })?;

    let server_config = server::Config {
        keys: vec![host_key],
        auth_rejection_time: Duration::from_millis(250),
        auth_rejection_time_initial: Some(Duration::from_millis(0)),
        keepalive_interval: Some(config.keepalive_interval),
        nodelay: true,
        ..Default::default()
    };

    let mut server = JumpServer {
        directory: Arc::new(Directory::from_config(config)),
    };

    tracing::info!(
        listen = %config.listen,
        port = config.port,
        endpoints = config.endpoints.len(),
        "starting directory server"
    );
    server
        .run_on_address(Arc::new(server_config), (config.listen.as_str(), config.port))
        .await?;
    Ok(())
}
