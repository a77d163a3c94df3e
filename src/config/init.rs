// ABOUTME: Config scaffolding for new directories.
// ABOUTME: Creates jumplist.yml template files.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

use super::CONFIG_FILENAME;

pub fn init_config(dir: &Path, force: bool) -> Result<PathBuf> {
    let config_path = dir.join(CONFIG_FILENAME);
    init_config_at(&config_path, force)?;
    Ok(config_path)
}

/// Write the template to exactly `config_path`.
pub fn init_config_at(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path.to_path_buf()));
    }

    std::fs::write(config_path, TEMPLATE)?;
    tracing::debug!("wrote config template to {}", config_path.display());

    Ok(())
}

const TEMPLATE: &str = r#"# Address and port the directory listens on.
listen: 0.0.0.0
port: 2222

# Server host key, relative to this file's directory.
# Generate one with: ssh-keygen -t ed25519 -N '' -f .jumplist/server_ed25519
host_key: .jumplist/server_ed25519

connect_timeout: 10s
keepalive_interval: 30s

auth:
  # Try the agent at SSH_AUTH_SOCK after the user's forwarded agent.
  local_agent: true
  # Extra private keys tried before ~/.ssh/id_ed25519, id_rsa, id_ecdsa.
  key_paths: []

endpoints:
  - name: example
    address: server.example.com:22
  # - "deploy@other.example.com:2222"
"#;
