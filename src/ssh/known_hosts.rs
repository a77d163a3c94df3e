// ABOUTME: Trust-on-first-use host key verification.
// ABOUTME: Backed by a known_hosts style file of "host key-type base64" lines.

use super::error::{Error, Result};
use russh::keys::HashAlg;
use russh::keys::ssh_key::PublicKey;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Outcome of checking a presented host key against the trust store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKeyStatus {
    /// No entry existed; the key was stored.
    Learned,
    /// An entry exists and matches.
    Trusted,
    /// An entry exists with a different key. Never replaced.
    Mismatch,
}

impl HostKeyStatus {
    pub fn is_accepted(self) -> bool {
        !matches!(self, HostKeyStatus::Mismatch)
    }
}

/// Host key verifier over a persistent trust store.
#[derive(Debug, Clone)]
pub struct HostKeyVerifier {
    path: PathBuf,
}

impl HostKeyVerifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check `key` for `host` (a known_hosts host column, see
    /// [`crate::types::HostAddress::known_hosts_pattern`]).
    pub fn verify(&self, host: &str, key: &PublicKey) -> Result<HostKeyStatus> {
        let known = self.keys_for(host)?;

        if known.is_empty() {
            tracing::warn!(
                "Trust-On-First-Use: accepting unknown host key for {} ({})",
                host,
                key.fingerprint(HashAlg::Sha256)
            );
            self.append(host, key)?;
            return Ok(HostKeyStatus::Learned);
        }

        if known.iter().any(|k| k.key_data() == key.key_data()) {
            Ok(HostKeyStatus::Trusted)
        } else {
            tracing::warn!(
                "host key mismatch for {}: presented {}",
                host,
                key.fingerprint(HashAlg::Sha256)
            );
            Ok(HostKeyStatus::Mismatch)
        }
    }

    /// All stored keys whose host column names `host`.
    fn keys_for(&self, host: &str) -> Result<Vec<PublicKey>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.store_error(e)),
        };

        let mut keys = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((hosts, key)) = line.split_once(char::is_whitespace) else {
                continue;
            };
            if !hosts.split(',').any(|h| h == host) {
                continue;
            }

            match PublicKey::from_openssh(key.trim()) {
                Ok(key) => keys.push(key),
                // An unreadable entry still pins the host.
                Err(e) => {
                    tracing::warn!(
                        "malformed key for {} at {}:{}: {}",
                        host,
                        self.path.display(),
                        lineno + 1,
                        e
                    );
                    return Err(Error::TrustStore {
                        path: self.path.clone(),
                        reason: format!("malformed entry for {} on line {}", host, lineno + 1),
                    });
                }
            }
        }

        Ok(keys)
    }

    fn append(&self, host: &str, key: &PublicKey) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| self.store_error(e))?;
        }

        let encoded = key.to_openssh().map_err(|e| Error::TrustStore {
            path: self.path.clone(),
            reason: format!("cannot encode host key: {}", e),
        })?;
        // Drop any comment: entries are exactly "host key-type base64".
        let key_fields: Vec<&str> = encoded.split_whitespace().take(2).collect();
        let line = format!("{} {}\n", host, key_fields.join(" "));

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.store_error(e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| self.store_error(e))?;

        Ok(())
    }

    fn store_error(&self, e: std::io::Error) -> Error {
        Error::TrustStore {
            path: self.path.clone(),
            reason: e.to_string(),
        }
    }
}
