//! WebSocket Listener for Live Reload
//!
//! Accepts browser sockets, completes the upgrade and hands each session to
//! the WsActor via channel. The acceptor runs on its own thread and stops
//! when the returned [`WsListener`] is stopped or dropped.

use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use crate::actor::messages::WsMsg;

/// Maximum port retry attempts
const MAX_PORT_RETRIES: u16 = 10;

/// Idle sleep between accept polls
const ACCEPT_POLL: Duration = Duration::from_millis(100);

/// Upper bound for a client to finish the upgrade handshake
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Running socket listener
pub struct WsListener {
    port: u16,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl WsListener {
    /// Port actually bound (may differ from the requested one)
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Stop accepting and join the acceptor thread. Idempotent.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for WsListener {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Bind (retrying upward from `base_port`) and start accepting sockets.
pub fn start_ws_server(host: IpAddr, base_port: u16, ws_tx: mpsc::Sender<WsMsg>) -> Result<WsListener> {
    let (listener, port) = try_bind_port(host, base_port, MAX_PORT_RETRIES)?;
    listener
        .set_nonblocking(true)
        .context("failed to configure socket listener")?;

    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = Arc::clone(&stop);
    let handle = std::thread::Builder::new()
        .name("relive-ws-accept".into())
        .spawn(move || accept_loop(listener, ws_tx, stop_flag))
        .context("failed to spawn acceptor thread")?;

    Ok(WsListener {
        port,
        stop,
        handle: Some(handle),
    })
}

fn accept_loop(listener: TcpListener, ws_tx: mpsc::Sender<WsMsg>, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, addr)) => {
                crate::debug!("ws"; "client connected: {}", addr);
                let Some(msg) = upgrade(stream, addr) else {
                    continue;
                };
                if ws_tx.blocking_send(msg).is_err() {
                    crate::debug!("ws"; "session actor gone, acceptor exiting");
                    break;
                }
            }
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL);
            }
            Err(e) => {
                crate::log!("ws"; "accept error: {}", e);
                std::thread::sleep(ACCEPT_POLL);
            }
        }
    }
}

/// Complete the handshake and switch the socket to non-blocking reads.
fn upgrade(stream: TcpStream, addr: SocketAddr) -> Option<WsMsg> {
    // Handshake is blocking and bounded
    let prepared = stream
        .set_nonblocking(false)
        .and_then(|_| stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT)));
    if let Err(e) = prepared {
        crate::debug!("ws"; "socket setup for {} failed: {}", addr, e);
        return None;
    }

    let socket = match tungstenite::accept(stream) {
        Ok(socket) => socket,
        Err(e) => {
            crate::debug!("ws"; "handshake with {} failed: {}", addr, e);
            return None;
        }
    };

    let stream = socket.get_ref();
    if let Err(e) = stream
        .set_read_timeout(None)
        .and_then(|_| stream.set_nonblocking(true))
    {
        crate::debug!("ws"; "socket setup for {} failed: {}", addr, e);
        return None;
    }

    Some(WsMsg::AddClient {
        transport: Box::new(socket),
        remote: addr.ip(),
    })
}

// =============================================================================
// Helpers
// =============================================================================

/// Try binding to port, retry with incremented port if in use
fn try_bind_port(host: IpAddr, base_port: u16, max_retries: u16) -> Result<(TcpListener, u16)> {
    let mut last_error = None;

    for offset in 0..max_retries {
        let port = base_port.saturating_add(offset);
        match TcpListener::bind(SocketAddr::new(host, port)) {
            Ok(listener) => {
                let actual_port = listener.local_addr()?.port();
                if offset > 0 {
                    crate::debug!("ws"; "port {} in use, bound {}", base_port, actual_port);
                }
                return Ok((listener, actual_port));
            }
            Err(e) => last_error = Some(e),
        }
    }

    Err(anyhow::anyhow!(
        "Failed to bind WebSocket server after {} attempts: {}",
        max_retries,
        last_error.map(|e| e.to_string()).unwrap_or_default()
    ))
}
