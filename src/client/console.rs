//! Remote console forwarding.
//!
//! Installed once per page on `initRemoteLogs`. Console calls routed through
//! it are sent to the server while the socket is open and always reach the
//! original output.

use serde::{Deserialize, Serialize};

use crate::reload::message::{ClientMessage, ConsoleLine};

/// Console method a forwarded line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Log,
    Warn,
    Error,
}

/// Wrapper around the page console.
#[derive(Debug, Default)]
pub struct RemoteConsole {
    installed: bool,
}

impl RemoteConsole {
    pub fn install(&mut self) {
        self.installed = true;
    }

    pub fn is_installed(&self) -> bool {
        self.installed
    }

    /// Frame to forward for a console call, if forwarding applies.
    pub fn forward(&self, level: ConsoleLevel, message: &[String], socket_open: bool) -> Option<String> {
        if !self.installed || !socket_open {
            return None;
        }
        let msg = ClientMessage::Console {
            console: ConsoleLine {
                level,
                message: message.to_vec(),
            },
        };
        Some(msg.to_wire())
    }
}
