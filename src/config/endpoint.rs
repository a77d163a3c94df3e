// ABOUTME: Directory endpoint configuration.
// ABOUTME: Parses short forms like "host", "user@host", "user@host:port".

use crate::types::{EndpointName, HostAddress};
use serde::Serialize;

/// A named, addressable proxy target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    #[serde(serialize_with = "serialize_display")]
    pub name: EndpointName,
    #[serde(serialize_with = "serialize_display")]
    pub address: HostAddress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl Endpoint {
    pub fn new(name: EndpointName, address: HostAddress) -> Self {
        Self {
            name,
            address,
            user: None,
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Parse `[user@]host[:port]`. The endpoint is named after the host.
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("endpoint cannot be empty".to_string());
        }

        let (user, rest) = match s.split_once('@') {
            Some((user, rest)) => (Some(user), rest),
            None => (None, s),
        };

        let address = HostAddress::parse(rest).map_err(|e| e.to_string())?;
        let name = EndpointName::new(address.host()).map_err(|e| e.to_string())?;

        Ok(Self {
            name,
            address,
            user: user.filter(|u| !u.is_empty()).map(str::to_string),
        })
    }

    /// User for the outbound connection: the endpoint override when set,
    /// otherwise the user of the inbound session.
    pub fn effective_user<'a>(&'a self, inbound_user: &'a str) -> &'a str {
        match self.user.as_deref() {
            Some(user) if !user.is_empty() => user,
            _ => inbound_user,
        }
    }
}

fn serialize_display<T, S>(value: &T, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    T: std::fmt::Display,
    S: serde::Serializer,
{
    serializer.collect_str(value)
}
