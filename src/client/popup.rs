//! In-page notification with duplicate suppression.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PopupKind {
    Info,
    Success,
    Error,
    Warn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PopupOptions {
    /// Seconds an animated popup stays visible
    pub time: u32,
    /// Slide in and out; `false` keeps the popup until hidden
    pub animation: bool,
}

impl Default for PopupOptions {
    fn default() -> Self {
        Self {
            time: 3,
            animation: true,
        }
    }
}

impl PopupOptions {
    pub fn persistent() -> Self {
        Self {
            animation: false,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Popup {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: PopupKind,
    pub options: PopupOptions,
}

impl Popup {
    pub fn new(message: impl Into<String>, kind: PopupKind, options: PopupOptions) -> Self {
        Self {
            message: message.into(),
            kind,
            options,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(message, PopupKind::Info, PopupOptions::default())
    }

    /// Identity used for deduplication: `(message, type, options)`.
    pub fn signature(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.message.clone())
    }

    /// Message text safe to place in markup
    pub fn escaped_message(&self) -> String {
        self.message.replace('<', "&lt;")
    }
}

/// Tracks what is showing so identical popups are not redisplayed.
#[derive(Debug, Default)]
pub struct PopupState {
    last_signature: Option<String>,
    visible: bool,
}

impl PopupState {
    /// Record a popup; `false` means it is already showing.
    pub fn show(&mut self, popup: &Popup) -> bool {
        let signature = popup.signature();
        if self.last_signature.as_deref() == Some(signature.as_str()) {
            return false;
        }
        self.last_signature = Some(signature);
        self.visible = true;
        true
    }

    /// Record a hide; `false` if nothing was showing.
    pub fn hide(&mut self) -> bool {
        self.last_signature = None;
        std::mem::take(&mut self.visible)
    }

    pub fn last_signature(&self) -> Option<&str> {
        self.last_signature.as_deref()
    }
}
