// ABOUTME: Configuration types and parsing for jumplist.yml.
// ABOUTME: Handles YAML parsing, endpoint validation, and config discovery.

mod endpoint;
mod init;

pub use endpoint::Endpoint;
pub use init::{init_config, init_config_at};

use crate::error::{Error, Result};
use crate::types::{EndpointName, HostAddress};
use nonempty::NonEmpty;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "jumplist.yml";
pub const CONFIG_FILENAME_ALT: &str = "jumplist.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".jumplist/config.yml";

/// Trust store for outbound host keys, relative to the config root.
pub const TRUST_STORE_PATH: &str = ".jumplist/known_hosts";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host_key")]
    pub host_key: PathBuf,

    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    #[serde(default = "default_keepalive_interval", with = "humantime_serde")]
    pub keepalive_interval: Duration,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(deserialize_with = "deserialize_endpoints")]
    pub endpoints: NonEmpty<Endpoint>,

    /// Directory the config was loaded from. Relative paths resolve against it.
    #[serde(skip)]
    pub root: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_local_agent")]
    pub local_agent: bool,

    #[serde(default)]
    pub key_paths: Vec<PathBuf>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            local_agent: default_local_agent(),
            key_paths: Vec::new(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    2222
}

fn default_host_key() -> PathBuf {
    PathBuf::from(".jumplist/server_ed25519")
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_keepalive_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_local_agent() -> bool {
    true
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(Error::from)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&content)?;
        config.root = config_root(path);
        Ok(config)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                let mut config = Self::load(path)?;
                // The config root is always the directory we searched, even
                // for the nested .jumplist/config.yml form.
                config.root = dir.to_path_buf();
                return Ok(config);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    /// Find an endpoint by name.
    pub fn endpoint(&self, name: &str) -> Result<&Endpoint> {
        self.endpoints
            .iter()
            .find(|e| e.name.as_str() == name)
            .ok_or_else(|| Error::UnknownEndpoint(name.to_string()))
    }

    pub fn trust_store_path(&self) -> PathBuf {
        self.root.join(TRUST_STORE_PATH)
    }

    pub fn host_key_path(&self) -> PathBuf {
        self.resolve(&self.host_key)
    }

    /// Configured key files, resolved against the config root.
    pub fn key_paths(&self) -> Vec<PathBuf> {
        self.auth.key_paths.iter().map(|p| self.resolve(p)).collect()
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

fn config_root(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

// Custom deserializers

fn deserialize_endpoints<'de, D>(deserializer: D) -> std::result::Result<NonEmpty<Endpoint>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let values: Vec<EndpointEntry> = Vec::deserialize(deserializer)?;
    let endpoints = values
        .into_iter()
        .map(|entry| entry.into_endpoint())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(serde::de::Error::custom)?;

    let mut seen = HashSet::new();
    for endpoint in &endpoints {
        if !seen.insert(endpoint.name.as_str()) {
            return Err(serde::de::Error::custom(format!(
                "duplicate endpoint name: {}",
                endpoint.name
            )));
        }
    }

    NonEmpty::from_vec(endpoints)
        .ok_or_else(|| serde::de::Error::custom("at least one endpoint is required"))
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EndpointEntry {
    Simple(String),
    Detailed {
        name: String,
        address: String,
        #[serde(default)]
        user: Option<String>,
    },
}

impl EndpointEntry {
    fn into_endpoint(self) -> std::result::Result<Endpoint, String> {
        match self {
            EndpointEntry::Simple(s) => Endpoint::parse(&s),
            EndpointEntry::Detailed {
                name,
                address,
                user,
            } => {
                let name = EndpointName::new(&name).map_err(|e| e.to_string())?;
                let address = HostAddress::parse(&address)
                    .map_err(|e| format!("endpoint {}: {}", name, e))?;
                Ok(Endpoint {
                    name,
                    address,
                    user: user.filter(|u| !u.is_empty()),
                })
            }
        }
    }
}
