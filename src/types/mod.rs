// ABOUTME: Validated domain types for the endpoint directory.
// ABOUTME: Endpoint names and host addresses are checked once at load time.

mod endpoint_name;
mod host_address;

pub use endpoint_name::{EndpointName, EndpointNameError};
pub use host_address::{DEFAULT_SSH_PORT, HostAddress, ParseHostAddressError};
