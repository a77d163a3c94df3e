// ABOUTME: SSH client side of the proxy: trust store, auth resolution, transport.
// ABOUTME: Built on russh with agent and key-based authentication.

mod auth;
mod client;
mod error;
mod known_hosts;

pub use auth::{
    AgentStrategy, AuthMethod, AuthResolver, AuthStrategy, DynAgent, ForwardedAgentStrategy,
    KeyFileStrategy, default_key_paths,
};
pub use client::{RusshTransport, TransportConfig};
pub use error::{Error, Result};
pub use known_hosts::{HostKeyStatus, HostKeyVerifier};
