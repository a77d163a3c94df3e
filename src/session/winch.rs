// ABOUTME: Forwards terminal resize events from the inbound to the outbound session.
// ABOUTME: Runs as a background task until completion or inbound close.

use super::inbound::WindowEvent;
use super::outbound::Resize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Why the relay stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayExit {
    /// The owning proxy call finished.
    Completed,
    /// The inbound session reported that it is gone.
    InboundClosed,
    /// The event sequence ended.
    EventsEnded,
    /// Forwarding a resize to the outbound session failed.
    ForwardFailed,
}

pub struct WindowChangeRelay {
    resizer: Arc<dyn Resize>,
    events: mpsc::UnboundedReceiver<WindowEvent>,
    done: CancellationToken,
}

impl WindowChangeRelay {
    pub fn new(
        resizer: Arc<dyn Resize>,
        events: mpsc::UnboundedReceiver<WindowEvent>,
        done: CancellationToken,
    ) -> Self {
        Self {
            resizer,
            events,
            done,
        }
    }

    pub fn spawn(self) -> JoinHandle<RelayExit> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) -> RelayExit {
        loop {
            let event = tokio::select! {
                biased;
                _ = self.done.cancelled() => return RelayExit::Completed,
                event = self.events.recv() => event,
            };

            let size = match event {
                None => return RelayExit::EventsEnded,
                Some(WindowEvent::Closed) => return RelayExit::InboundClosed,
                // Legacy transports signal a dead session with 0x0.
                Some(WindowEvent::Resize(size)) if size.is_zero() => {
                    return RelayExit::InboundClosed;
                }
                Some(WindowEvent::Resize(size)) => size,
            };

            let forwarded = tokio::select! {
                biased;
                _ = self.done.cancelled() => return RelayExit::Completed,
                result = self.resizer.window_change(size) => result,
            };
            if let Err(e) = forwarded {
                tracing::warn!("failed to notify window change: {}", e);
                return RelayExit::ForwardFailed;
            }
        }
    }
}
