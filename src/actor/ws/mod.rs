//! WebSocket Actor - Session Registry
//!
//! This actor is responsible for:
//! - Greeting and tracking browser sessions
//! - Broadcasting updates, immediately or after the configured wait
//! - Targeted push to sessions showing a specific file
//! - Reading client frames (page identity, forwarded console lines)
//!
//! # Architecture
//!
//! ```text
//! Dispatcher --[Broadcast/SendTo]--> WsActor --[frames]--> Sessions
//!                                       ^                      |
//!                                       +---[file / console]---+
//! ```

mod client_io;
mod color;
mod registry;
mod session;
mod transport;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use tokio::sync::mpsc;

use super::messages::WsMsg;

pub use color::{ColorAssigner, ColorTag};
pub use registry::SessionRegistry;
pub use session::{Session, SessionId};
pub use transport::{Inbound, Transport, TransportError};

/// WebSocket Actor - owns the registry's message loop
pub struct WsActor {
    rx: mpsc::Receiver<WsMsg>,
    registry: Arc<SessionRegistry>,
}

impl WsActor {
    pub fn new(rx: mpsc::Receiver<WsMsg>, registry: Arc<SessionRegistry>) -> Self {
        Self { rx, registry }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        if let Err(e) = client_io::spawn_reader(Arc::clone(&self.registry)) {
            crate::log!("ws"; "failed to start reader: {}", e);
        }

        while let Some(msg) = self.rx.recv().await {
            match msg {
                WsMsg::AddClient { transport, remote } => {
                    if let Err(e) = self.registry.register(transport, remote) {
                        crate::log!("ws"; "failed to greet {}: {}", remote, e);
                    }
                }

                WsMsg::Broadcast { message, delay } => match delay {
                    Some(delay) if !delay.is_zero() => {
                        self.registry.broadcast_with_delay(&message, delay);
                    }
                    _ => {
                        self.registry.broadcast(&message);
                    }
                },

                WsMsg::SendTo { file, message } => {
                    self.registry.send_to(&file, &message);
                }

                WsMsg::Shutdown(ack) => {
                    crate::debug!("ws"; "shutting down");
                    self.registry.shutdown();
                    let _ = ack.send(());
                    return;
                }
            }
        }

        self.registry.shutdown();
    }
}
