//! Actor Message Definitions
//!
//! ```text
//! FsActor --Change--> Dispatcher --Broadcast/SendTo--> WsActor
//!                        |   ^
//!                  submit|   |TaskOutcome
//!                        v   |
//!                     WorkerPool
//! ```

use std::net::IpAddr;
use std::time::Duration;

use tokio::sync::oneshot;

use super::ws::Transport;
use crate::reload::classify::ChangeEvent;
use crate::reload::message::{CursorPosition, ServerMessage};

// =============================================================================
// Dispatcher Messages
// =============================================================================

#[derive(Debug)]
pub enum DispatchMsg {
    /// A debounced filesystem change
    Change(ChangeEvent),
    /// Unsaved editor contents to run through the hot-body path
    /// (`POST /relive/editor`)
    EditorBuffer {
        file_name: String,
        text: String,
        cursor: Option<CursorPosition>,
    },
    /// Point every session at another URL (`POST /relive/navigate`)
    Navigate { url: String },
    /// Stop after acknowledging
    Shutdown(oneshot::Sender<()>),
}

// =============================================================================
// WsActor Messages
// =============================================================================

pub enum WsMsg {
    /// A socket that finished the upgrade handshake
    AddClient {
        transport: Box<dyn Transport>,
        remote: IpAddr,
    },
    /// Every session; `delay` schedules per-session delivery
    Broadcast {
        message: ServerMessage,
        delay: Option<Duration>,
    },
    /// Sessions whose associated file is `file`
    SendTo { file: String, message: ServerMessage },
    /// Close every session, then acknowledge
    Shutdown(oneshot::Sender<()>),
}
