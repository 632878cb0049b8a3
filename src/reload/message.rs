//! Live Reload Wire Protocol
//!
//! Text frames exchanged over the socket between the server and browser
//! sessions.
//!
//! # Server → client
//!
//! | Frame                 | Meaning                                      |
//! |-----------------------|----------------------------------------------|
//! | `connected`           | handshake done                               |
//! | `reload`              | full page reload                             |
//! | `refreshcss`          | re-fetch stylesheets, show a notice          |
//! | `refreshcss-silent`   | re-fetch stylesheets quietly                 |
//! | `initRemoteLogs`      | start forwarding the browser console         |
//! | JSON object           | [`UpdatePayload`], any subset of fields      |
//!
//! # Client → server
//!
//! JSON only: `{"file": ..}` identifies the page, `{"console": {..}}`
//! carries a forwarded console call.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::client::ConsoleLevel;

/// Signals that remove the browser notification instead of showing one.
pub const HIDE_SIGNALS: [&str; 3] = ["HIDE", "HIDE_MESSAGE", "HIDE_MESSAGES"];

/// Check whether a `message` value is a hide signal
pub fn is_hide_signal(message: &str) -> bool {
    HIDE_SIGNALS.contains(&message)
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unrecognized frame")]
    Unrecognized,
}

// =============================================================================
// Server → client
// =============================================================================

/// Cursor location inside an editor buffer (zero-based line and column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub line: usize,
    pub character: usize,
}

/// Structured update; fields are applied independently by the browser.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hot: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<CursorPosition>,
}

impl UpdatePayload {
    /// Hot-patch the page body.
    pub fn hot_body(body: impl Into<String>) -> Self {
        Self {
            body: Some(body.into()),
            hot: Some(true),
            ..Self::default()
        }
    }

    /// Show validation diagnostics.
    pub fn messages(messages: Vec<String>) -> Self {
        Self {
            messages: Some(messages),
            ..Self::default()
        }
    }

    /// Clear whatever notification is showing.
    pub fn hide_messages() -> Self {
        Self {
            message: Some("HIDE_MESSAGES".to_string()),
            ..Self::default()
        }
    }

    pub fn navigate(url: impl Into<String>) -> Self {
        Self {
            navigate: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn is_hot(&self) -> bool {
        self.hot.unwrap_or(false)
    }
}

/// A frame sent from the server to a browser session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    Connected,
    Reload,
    RefreshCss,
    RefreshCssSilent,
    InitRemoteLogs,
    Update(UpdatePayload),
}

impl ServerMessage {
    /// Serialize to the text frame.
    pub fn to_wire(&self) -> String {
        match self {
            Self::Connected => "connected".to_string(),
            Self::Reload => "reload".to_string(),
            Self::RefreshCss => "refreshcss".to_string(),
            Self::RefreshCssSilent => "refreshcss-silent".to_string(),
            Self::InitRemoteLogs => "initRemoteLogs".to_string(),
            Self::Update(payload) => {
                serde_json::to_string(payload).unwrap_or_else(|_| "reload".to_string())
            }
        }
    }

    /// Parse a text frame. Plain keywords first, JSON otherwise.
    pub fn parse(frame: &str) -> Result<Self, ProtocolError> {
        match frame {
            "connected" => Ok(Self::Connected),
            "reload" => Ok(Self::Reload),
            "refreshcss" => Ok(Self::RefreshCss),
            "refreshcss-silent" => Ok(Self::RefreshCssSilent),
            "initRemoteLogs" => Ok(Self::InitRemoteLogs),
            _ => Ok(Self::Update(serde_json::from_str(frame)?)),
        }
    }
}

// =============================================================================
// Client → server
// =============================================================================

/// A console call forwarded by the browser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleLine {
    #[serde(rename = "type")]
    pub level: ConsoleLevel,
    #[serde(default)]
    pub message: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientMessage {
    Console { console: ConsoleLine },
    Identify { file: String },
}

impl ClientMessage {
    pub fn parse(frame: &str) -> Result<Self, ProtocolError> {
        let value: serde_json::Value = serde_json::from_str(frame)?;
        if !value.is_object() {
            return Err(ProtocolError::Unrecognized);
        }
        serde_json::from_value(value).map_err(|_| ProtocolError::Unrecognized)
    }

    pub fn to_wire(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
