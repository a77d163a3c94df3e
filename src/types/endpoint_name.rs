// ABOUTME: Display name of a directory endpoint.
// ABOUTME: Non-empty, bounded length, printable and free of whitespace.

use std::fmt;
use thiserror::Error;

const MAX_LEN: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EndpointNameError {
    #[error("endpoint name cannot be empty")]
    Empty,

    #[error("endpoint name exceeds maximum length of 64 characters")]
    TooLong,

    #[error("invalid character in endpoint name: {0:?}")]
    InvalidChar(char),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointName(String);

impl EndpointName {
    pub fn new(value: &str) -> Result<Self, EndpointNameError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(EndpointNameError::Empty);
        }

        if value.chars().count() > MAX_LEN {
            return Err(EndpointNameError::TooLong);
        }

        if let Some(c) = value.chars().find(|c| c.is_whitespace() || c.is_control()) {
            return Err(EndpointNameError::InvalidChar(c));
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_simple_names() {
        assert_eq!(EndpointName::new("db1").unwrap().as_str(), "db1");
        assert_eq!(EndpointName::new("  web-02 ").unwrap().as_str(), "web-02");
    }

    #[test]
    fn rejects_blank_and_spaced_names() {
        assert_eq!(EndpointName::new("   "), Err(EndpointNameError::Empty));
        assert_eq!(
            EndpointName::new("db one"),
            Err(EndpointNameError::InvalidChar(' '))
        );
        assert_eq!(
            EndpointName::new("db\x1b"),
            Err(EndpointNameError::InvalidChar('\x1b'))
        );
    }

    #[test]
    fn rejects_long_names() {
        let name = "a".repeat(65);
        assert_eq!(EndpointName::new(&name), Err(EndpointNameError::TooLong));
        assert!(EndpointName::new(&"a".repeat(64)).is_ok());
    }
}
