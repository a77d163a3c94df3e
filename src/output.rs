// ABOUTME: Output formatting for CLI feedback.
// ABOUTME: Supports human-readable and JSON lines output modes.

use crate::config::Endpoint;
use serde::Serialize;

/// Output mode for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-friendly text
    Normal,
    /// JSON lines for scripting
    Json,
}

/// Handles CLI output based on the configured mode.
pub struct Output {
    mode: OutputMode,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Format one directory entry.
    pub fn format_endpoint(&self, endpoint: &Endpoint) -> String {
        match self.mode {
            OutputMode::Normal => match &endpoint.user {
                Some(user) => format!(
                    "{}\tssh://{}@{}",
                    endpoint.name, user, endpoint.address
                ),
                None => format!("{}\tssh://{}", endpoint.name, endpoint.address),
            },
            OutputMode::Json => {
                let event = JsonEvent {
                    event: "endpoint",
                    message: None,
                    endpoint: Some(endpoint),
                };
                serde_json::to_string(&event).unwrap_or_default()
            }
        }
    }

    /// Print one directory entry.
    pub fn endpoint(&self, endpoint: &Endpoint) {
        println!("{}", self.format_endpoint(endpoint));
    }

    /// Print an error message.
    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => {
                eprintln!("Error: {message}");
            }
            OutputMode::Json => {
                let event = JsonEvent {
                    event: "error",
                    message: Some(message),
                    endpoint: None,
                };
                if let Ok(json) = serde_json::to_string(&event) {
                    eprintln!("{json}");
                }
            }
        }
    }
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    endpoint: Option<&'a Endpoint>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_lines_carry_endpoint_fields() {
        let endpoint = Endpoint::parse("admin@db.internal:2222").unwrap();
        let line = Output::new(OutputMode::Json).format_endpoint(&endpoint);
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["event"], "endpoint");
        assert_eq!(value["endpoint"]["name"], "db.internal");
        assert_eq!(value["endpoint"]["address"], "db.internal:2222");
        assert_eq!(value["endpoint"]["user"], "admin");
    }

    #[test]
    fn text_lines_show_ssh_url() {
        let endpoint = Endpoint::parse("db.internal").unwrap();
        assert_eq!(
            Output::new(OutputMode::Normal).format_endpoint(&endpoint),
            "db.internal\tssh://db.internal:22"
        );
    }
}
