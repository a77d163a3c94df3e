// ABOUTME: Outbound authentication method resolution.
// ABOUTME: Tries forwarded agent, local agent, then key files in priority order.

use super::error::{Error, Result};
use crate::session::{AgentStreamBox, Closers, InboundSession};
use async_trait::async_trait;
use russh::keys::agent::client::AgentClient;
use russh::keys::{HashAlg, PrivateKey, load_secret_key};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::UnixStream;

/// Agent client over any agent byte stream.
pub type DynAgent = AgentClient<AgentStreamBox>;

/// Credential used to authenticate the outbound connection.
pub enum AuthMethod {
    /// Sign with keys held by an agent. `source` names where it came from.
    Agent {
        client: DynAgent,
        source: &'static str,
    },
    /// Sign with a private key loaded into memory.
    Key(Arc<PrivateKey>),
}

impl std::fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthMethod::Agent { source, .. } => {
                f.debug_struct("Agent").field("source", source).finish()
            }
            AuthMethod::Key(key) => f
                .debug_tuple("Key")
                .field(&key.public_key().fingerprint(HashAlg::Sha256).to_string())
                .finish(),
        }
    }
}

impl AuthMethod {
    pub fn describe(&self) -> &'static str {
        match self {
            AuthMethod::Agent { source, .. } => source,
            AuthMethod::Key(_) => "key file",
        }
    }
}

/// One way of obtaining an [`AuthMethod`].
#[async_trait]
pub trait AuthStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` when this strategy has nothing to offer. Resources opened
    /// while probing are registered on `closers` whether or not the method
    /// is used.
    async fn probe(
        &self,
        inbound: &InboundSession,
        closers: &mut Closers,
    ) -> Result<Option<AuthMethod>>;
}

/// The agent forwarded by the inbound client, if it requested forwarding.
#[derive(Debug, Default)]
pub struct ForwardedAgentStrategy;

#[async_trait]
impl AuthStrategy for ForwardedAgentStrategy {
    fn name(&self) -> &'static str {
        "forwarded agent"
    }

    async fn probe(
        &self,
        inbound: &InboundSession,
        closers: &mut Closers,
    ) -> Result<Option<AuthMethod>> {
        let Some(forwarder) = inbound.agent() else {
            return Ok(None);
        };

        let stream = forwarder.open(closers).await?;
        with_identities(AgentClient::connect(stream), self.name()).await
    }
}

/// The agent on this host, reached through a Unix socket.
#[derive(Debug, Clone, Default)]
pub struct AgentStrategy {
    socket: Option<PathBuf>,
}

impl AgentStrategy {
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: Some(socket.into()),
        }
    }

    /// Use `SSH_AUTH_SOCK`, if set.
    pub fn from_env() -> Self {
        Self {
            socket: std::env::var_os("SSH_AUTH_SOCK")
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
        }
    }
}

#[async_trait]
impl AuthStrategy for AgentStrategy {
    fn name(&self) -> &'static str {
        "local agent"
    }

    async fn probe(
        &self,
        _inbound: &InboundSession,
        _closers: &mut Closers,
    ) -> Result<Option<AuthMethod>> {
        let Some(socket) = &self.socket else {
            return Ok(None);
        };

        let stream = UnixStream::connect(socket).await.map_err(|e| {
            Error::AgentUnavailable(format!("cannot connect to {}: {}", socket.display(), e))
        })?;
        let stream: AgentStreamBox = Box::new(stream);
        with_identities(AgentClient::connect(stream), self.name()).await
    }
}

/// Private keys on disk, tried in order. Missing or unreadable files are
/// skipped.
#[derive(Debug, Clone, Default)]
pub struct KeyFileStrategy {
    paths: Vec<PathBuf>,
}

impl KeyFileStrategy {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

#[async_trait]
impl AuthStrategy for KeyFileStrategy {
    fn name(&self) -> &'static str {
        "key file"
    }

    async fn probe(
        &self,
        _inbound: &InboundSession,
        _closers: &mut Closers,
    ) -> Result<Option<AuthMethod>> {
        for path in &self.paths {
            if !path.exists() {
                continue;
            }
            match load_secret_key(path, None) {
                Ok(key) => {
                    tracing::debug!("using key {}", path.display());
                    return Ok(Some(AuthMethod::Key(Arc::new(key))));
                }
                Err(e) => {
                    tracing::debug!("skipping key {}: {}", path.display(), e);
                }
            }
        }
        Ok(None)
    }
}

async fn with_identities(
    mut client: DynAgent,
    source: &'static str,
) -> Result<Option<AuthMethod>> {
    let identities = client
        .request_identities()
        .await
        .map_err(|e| Error::AgentUnavailable(format!("failed to list agent keys: {}", e)))?;

    if identities.is_empty() {
        tracing::debug!("{} holds no keys", source);
        return Ok(None);
    }

    Ok(Some(AuthMethod::Agent { client, source }))
}

/// `~/.ssh/id_ed25519`, `~/.ssh/id_rsa` and `~/.ssh/id_ecdsa`.
pub fn default_key_paths() -> Vec<PathBuf> {
    let Some(home) = std::env::var_os("HOME").filter(|h| !h.is_empty()) else {
        return Vec::new();
    };
    let ssh_dir = PathBuf::from(home).join(".ssh");
    ["id_ed25519", "id_rsa", "id_ecdsa"]
        .iter()
        .map(|name| ssh_dir.join(name))
        .collect()
}

/// Picks the first usable [`AuthMethod`] from an ordered list of strategies.
pub struct AuthResolver {
    strategies: Vec<Box<dyn AuthStrategy>>,
}

impl std::fmt::Debug for AuthResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.strategies.iter().map(|s| s.name()))
            .finish()
    }
}

impl AuthResolver {
    pub fn new(strategies: Vec<Box<dyn AuthStrategy>>) -> Self {
        Self { strategies }
    }

    /// Forwarded agent, then the local agent (when enabled), then
    /// `key_paths` followed by the default keys.
    pub fn from_config(local_agent: bool, key_paths: Vec<PathBuf>) -> Self {
        let mut strategies: Vec<Box<dyn AuthStrategy>> = vec![Box::new(ForwardedAgentStrategy)];
        if local_agent {
            strategies.push(Box::new(AgentStrategy::from_env()));
        }

        let mut paths = key_paths;
        paths.extend(default_key_paths());
        strategies.push(Box::new(KeyFileStrategy::new(paths)));

        Self::new(strategies)
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub async fn resolve(
        &self,
        inbound: &InboundSession,
        closers: &mut Closers,
    ) -> Result<AuthMethod> {
        for strategy in &self.strategies {
            match strategy.probe(inbound, closers).await {
                Ok(Some(method)) => {
                    tracing::debug!(user = %inbound.user(), "authenticating with {}", strategy.name());
                    return Ok(method);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!("{} unavailable: {}", strategy.name(), e);
                }
            }
        }

        Err(Error::NoAuthMethod(format!(
            "tried {}",
            self.strategy_names().join(", ")
        )))
    }
}
