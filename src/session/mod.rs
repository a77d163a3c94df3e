// ABOUTME: Session proxy core: relays an inbound terminal session to an outbound SSH session.
// ABOUTME: Owns stream wiring, resize forwarding, and scoped resource cleanup.

mod closers;
mod inbound;
mod multiplex;
mod outbound;
mod proxy;
mod winch;

pub use closers::Closers;
pub use inbound::{
    AgentForwarder, AgentStreamBox, Identity, InboundFrame, InboundSession, OutputSink, PtyInfo,
    WindowEvent, WindowSize,
};
pub use multiplex::{MultiplexReader, multiplex};
pub use outbound::{ConnectParams, OutboundSession, Resize, Stdio, Transport};
pub use proxy::{ProxyError, ProxyErrorKind, SessionProxy, TERMINAL_RESET};
pub use winch::{RelayExit, WindowChangeRelay};
