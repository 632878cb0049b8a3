//! Process-wide shutdown state.
//!
//! Ctrl+C notifies the actor system through the registered
//! channel and unblocks the status server. Before anything is registered
//! the process exits right away.

use std::sync::{Arc, OnceLock};

use tiny_http::Server;

/// HTTP server reference for graceful shutdown
static SERVER: OnceLock<Arc<Server>> = OnceLock::new();

/// Shutdown signal sender for actor system
static SHUTDOWN_TX: OnceLock<crossbeam::channel::Sender<()>> = OnceLock::new();

/// Setup the global Ctrl+C handler. Call once at program start
pub fn setup_shutdown_handler() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        request_shutdown();

        if let Some(server) = SERVER.get() {
            crate::log!("serve"; "shutting down...");
            server.unblock();
        } else if SHUTDOWN_TX.get().is_none() {
            // Nothing running yet
            std::process::exit(0);
        }
    })
    .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {}", e))
}

/// Register the status server and the actor shutdown channel.
///
/// Call after binding, before waiting on the actors.
pub fn register_server(server: Arc<Server>, shutdown_tx: crossbeam::channel::Sender<()>) {
    let _ = SERVER.set(server);
    let _ = SHUTDOWN_TX.set(shutdown_tx);
}

/// Notify the actor system if it is registered.
pub fn request_shutdown() {
    if let Some(tx) = SHUTDOWN_TX.get() {
        let _ = tx.try_send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shutdown() {
        let (tx, rx) = crossbeam::channel::bounded(1);
        let registered = SHUTDOWN_TX.set(tx).is_ok();

        request_shutdown();
        // Repeated requests never block on the full channel
        request_shutdown();

        if registered {
            assert!(rx.try_recv().is_ok());
            assert!(rx.try_recv().is_err());
        }
    }
}
