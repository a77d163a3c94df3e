// ABOUTME: Network address of an SSH endpoint.
// ABOUTME: Parses "host", "host:port" and "[v6addr]:port" forms.

use std::fmt;
use thiserror::Error;

pub const DEFAULT_SSH_PORT: u16 = 22;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseHostAddressError {
    #[error("address cannot be empty")]
    Empty,

    #[error("hostname cannot be empty")]
    EmptyHost,

    #[error("invalid port: {0}")]
    InvalidPort(String),

    #[error("unterminated bracket in address: {0}")]
    UnterminatedBracket(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostAddress {
    host: String,
    port: u16,
}

impl HostAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn parse(input: &str) -> Result<Self, ParseHostAddressError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ParseHostAddressError::Empty);
        }

        let (host, port) = if let Some(rest) = input.strip_prefix('[') {
            let (host, after) = rest
                .split_once(']')
                .ok_or_else(|| ParseHostAddressError::UnterminatedBracket(input.to_string()))?;
            match after.strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None if after.is_empty() => (host, None),
                None => return Err(ParseHostAddressError::InvalidPort(after.to_string())),
            }
        } else {
            match input.rsplit_once(':') {
                // A bare IPv6 address has more than one colon and no port.
                Some((host, _)) if host.contains(':') => (input, None),
                Some((host, port)) => (host, Some(port)),
                None => (input, None),
            }
        };

        if host.is_empty() {
            return Err(ParseHostAddressError::EmptyHost);
        }

        let port = match port {
            Some(p) => p
                .parse::<u16>()
                .ok()
                .filter(|p| *p != 0)
                .ok_or_else(|| ParseHostAddressError::InvalidPort(p.to_string()))?,
            None => DEFAULT_SSH_PORT,
        };

        Ok(Self::new(host, port))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Host column used in known_hosts files: `host` on the default port,
    /// `[host]:port` otherwise.
    pub fn known_hosts_pattern(&self) -> String {
        if self.port == DEFAULT_SSH_PORT {
            self.host.clone()
        } else {
            format!("[{}]:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for HostAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}
