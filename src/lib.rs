// ABOUTME: Library root for jumplist - exposes public types for testing.
// ABOUTME: The main binary is in main.rs.

pub mod config;
pub mod error;
pub mod output;
pub mod server;
pub mod session;
pub mod ssh;
pub mod types;
