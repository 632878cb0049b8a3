//! Browser-side protocol state machine.
//!
//! ```text
//! Idle → StatusChecking → Connecting → Connected ⇄ Reconnecting
//!              │                                       │
//!              └──────────────→ GivenUp ←──────────────┘
//! ```
//!
//! `GivenUp` schedules one forced reload. A successful reconnect always
//! reloads the page: hot-patch state cannot be trusted across an outage.

use thiserror::Error;

use super::backoff::{ConnectionAttemptState, GIVE_UP_RELOAD, STATUS_RETRY};
use super::console::{ConsoleLevel, RemoteConsole};
use super::host::{Host, StatusResponse, Timer, cache_bust};
use super::popup::{Popup, PopupKind, PopupOptions, PopupState};
use crate::dom::{self, Node, ParseError, PatchError};
use crate::reload::message::{ClientMessage, ServerMessage, UpdatePayload, is_hide_signal};

/// Delay before the lost-connection notice, so a page unloading on
/// `reload` does not flash it.
const LOST_CONNECTION_DELAY: std::time::Duration = std::time::Duration::from_millis(300);

pub const CONNECTED_MSG: &str = "[relive] connected.";
pub const DIFF_ERROR_MSG: &str = "Having issues parsing the DOM.\nPlease verify that your HTML is valid...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Idle,
    StatusChecking,
    Connecting,
    Connected,
    Reconnecting,
    GivenUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffEngineStatus {
    Unloaded,
    Loading,
    Ready,
}

/// Why a hot-body update was rejected
#[derive(Debug, Error)]
pub enum HotPatchError {
    #[error("unparsable body: {0}")]
    Parse(#[from] ParseError),
    #[error("patch failed: {0}")]
    Patch(#[from] PatchError),
}

/// Page state owned by the engine
#[derive(Debug)]
pub struct ClientDomState {
    /// Body the last successful patch produced
    pub snapshot: Vec<Node>,
    pub diff_engine: DiffEngineStatus,
    pub popup: PopupState,
    pub last_diff_error: bool,
    /// Newest hot body received while the diff engine loads
    pending_body: Option<String>,
}

pub struct ClientEngine {
    state: ClientState,
    attempts: ConnectionAttemptState,
    dom: ClientDomState,
    console: RemoteConsole,
}

impl ClientEngine {
    /// `initial_body` is the page body as served, before scripts ran.
    pub fn new(initial_body: Vec<Node>) -> Self {
        Self {
            state: ClientState::Idle,
            attempts: ConnectionAttemptState::default(),
            dom: ClientDomState {
                snapshot: initial_body,
                diff_engine: DiffEngineStatus::Unloaded,
                popup: PopupState::default(),
                last_diff_error: false,
                pending_body: None,
            },
            console: RemoteConsole::default(),
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn attempts(&self) -> &ConnectionAttemptState {
        &self.attempts
    }

    pub fn dom(&self) -> &ClientDomState {
        &self.dom
    }

    // =========================================================================
    // Connection lifecycle
    // =========================================================================

    /// Page loaded: start probing the server.
    pub fn start(&mut self, host: &mut impl Host) {
        if self.state != ClientState::Idle {
            return;
        }
        self.state = ClientState::StatusChecking;
        host.fetch_status();
    }

    pub fn on_status(&mut self, host: &mut impl Host, response: StatusResponse) {
        if self.state != ClientState::StatusChecking {
            return;
        }
        if response.is_online() {
            self.attempts.status_ok();
            self.state = ClientState::Connecting;
            host.open_socket();
        } else if self.attempts.status_failed() {
            self.log(host, "[relive] status check...");
            host.set_timer(Timer::StatusRetry, STATUS_RETRY);
        } else {
            host.console_output(
                ConsoleLevel::Error,
                &["[relive] status check failed".to_string()],
            );
            self.give_up(host);
        }
    }

    pub fn on_open(&mut self, host: &mut impl Host) {
        if self.attempts.is_reconnecting() {
            host.reload();
            return;
        }
        self.state = ClientState::Connected;
        for file in host.page_files() {
            host.send(&ClientMessage::Identify { file }.to_wire());
        }
    }

    pub fn on_close(&mut self, host: &mut impl Host) {
        if self.state == ClientState::GivenUp {
            return;
        }
        host.set_timer(Timer::LostConnectionNotice, LOST_CONNECTION_DELAY);
        if !self.attempts.is_reconnecting() {
            self.log(host, "Socket is closed. Reconnect will be attempted in 1 second.");
        }
        match self.attempts.next_reconnect() {
            Some(delay) => {
                self.state = ClientState::Reconnecting;
                host.set_timer(Timer::Reconnect, delay);
            }
            None => self.give_up(host),
        }
    }

    pub fn on_timer(&mut self, host: &mut impl Host, timer: Timer) {
        match timer {
            Timer::StatusRetry if self.state == ClientState::StatusChecking => host.fetch_status(),
            Timer::Reconnect if self.state == ClientState::Reconnecting => {
                if self.attempts.attempt_count > 1 {
                    self.log(host, "connecting...");
                }
                self.state = ClientState::Connecting;
                host.open_socket();
            }
            Timer::LostConnectionNotice => {
                self.popup(
                    host,
                    Popup::new(
                        "lost connection to dev server",
                        PopupKind::Error,
                        PopupOptions::default(),
                    ),
                );
            }
            Timer::ForcedReload => host.reload(),
            _ => {}
        }
    }

    fn give_up(&mut self, host: &mut impl Host) {
        self.state = ClientState::GivenUp;
        self.log(host, "[relive] browser reloads in 5 seconds");
        host.set_timer(Timer::ForcedReload, GIVE_UP_RELOAD);
    }

    // =========================================================================
    // Inbound frames
    // =========================================================================

    pub fn on_message(&mut self, host: &mut impl Host, frame: &str) {
        self.attempts.reset();

        let message = match ServerMessage::parse(frame) {
            Ok(message) => message,
            Err(e) => {
                host.console_output(ConsoleLevel::Error, &[format!("[relive] {e}")]);
                return;
            }
        };

        match message {
            ServerMessage::Reload => host.reload(),
            ServerMessage::RefreshCss => self.refresh_css(host, true),
            ServerMessage::RefreshCssSilent => self.refresh_css(host, false),
            ServerMessage::Connected => {
                self.log(host, CONNECTED_MSG);
                self.popup(
                    host,
                    Popup::new("connected", PopupKind::Success, PopupOptions::default()),
                );
            }
            ServerMessage::InitRemoteLogs => self.console.install(),
            ServerMessage::Update(payload) => self.apply_update(host, payload),
        }
    }

    fn apply_update(&mut self, host: &mut impl Host, payload: UpdatePayload) {
        if let Some(url) = &payload.navigate {
            host.navigate(url);
        }
        if let Some(body) = payload.body.clone() {
            if payload.is_hot() {
                self.hot_body(host, body);
            } else {
                self.replace_body(host, &body);
            }
        }
        if let Some(messages) = &payload.messages {
            self.show_message(host, &messages.join("\n\n"));
        }
        if let Some(message) = &payload.message {
            self.show_message(host, message);
        }
    }

    fn refresh_css(&mut self, host: &mut impl Host, notice: bool) {
        let now = host.now_ms();
        let links: Vec<_> = host
            .stylesheet_links()
            .into_iter()
            .enumerate()
            .filter(|(_, link)| link.is_stylesheet())
            .collect();
        for (index, link) in &links {
            host.reinsert_stylesheet(*index, &cache_bust(&link.href, now));
        }
        if notice && !links.is_empty() {
            self.popup(host, Popup::info("css updated"));
        }
    }

    fn replace_body(&mut self, host: &mut impl Host, body: &str) {
        host.replace_body(body);
        if let Ok(nodes) = dom::parse_fragment(body) {
            self.dom.snapshot = nodes;
        }
    }

    fn show_message(&mut self, host: &mut impl Host, message: &str) {
        if is_hide_signal(message) {
            self.hide_popup(host);
        } else {
            self.popup(
                host,
                Popup::new(message, PopupKind::Info, PopupOptions::persistent()),
            );
        }
    }

    // =========================================================================
    // Hot-body transaction
    // =========================================================================

    fn hot_body(&mut self, host: &mut impl Host, body: String) {
        match self.dom.diff_engine {
            DiffEngineStatus::Unloaded => {
                self.dom.pending_body = Some(body);
                self.dom.diff_engine = DiffEngineStatus::Loading;
                host.load_diff_engine();
            }
            DiffEngineStatus::Loading => self.dom.pending_body = Some(body),
            DiffEngineStatus::Ready => self.patch_body(host, &body),
        }
    }

    pub fn on_diff_engine_ready(&mut self, host: &mut impl Host) {
        self.dom.diff_engine = DiffEngineStatus::Ready;
        if let Some(body) = self.dom.pending_body.take() {
            self.patch_body(host, &body);
        }
    }

    /// Diff against the snapshot, try the patch on a copy of the live body,
    /// then commit. The snapshot only advances after the commit succeeds.
    fn patch_body(&mut self, host: &mut impl Host, body: &str) {
        match self.try_patch(host, body) {
            Ok((nodes, changed)) => {
                let highlighted = nodes.iter().any(Node::has_highlight);
                self.dom.snapshot = nodes;
                if self.dom.last_diff_error {
                    self.dom.last_diff_error = false;
                    self.show_message(host, "HIDE");
                }
                if changed && highlighted {
                    host.scroll_to_highlight();
                }
            }
            Err(e) => {
                self.dom.last_diff_error = true;
                host.console_output(ConsoleLevel::Error, &[format!("[relive] {e}")]);
                self.popup(
                    host,
                    Popup::new(DIFF_ERROR_MSG, PopupKind::Error, PopupOptions::persistent()),
                );
            }
        }
    }

    fn try_patch(&self, host: &mut impl Host, body: &str) -> Result<(Vec<Node>, bool), HotPatchError> {
        let nodes = dom::parse_fragment(body)?;
        let patches = dom::diff(&self.dom.snapshot, &nodes);
        if patches.is_empty() {
            return Ok((nodes, false));
        }
        dom::apply_cloned(&host.body(), &patches)?;
        host.commit_body(&patches)?;
        Ok((nodes, true))
    }

    // =========================================================================
    // Console and popups
    // =========================================================================

    /// Route a page console call: forwarded when remote logs are on, always
    /// written to the original console.
    pub fn console(&mut self, host: &mut impl Host, level: ConsoleLevel, message: &[String]) {
        let open = self.state == ClientState::Connected;
        if let Some(frame) = self.console.forward(level, message, open) {
            host.send(&frame);
        }
        host.console_output(level, message);
    }

    pub fn remote_logs_installed(&self) -> bool {
        self.console.is_installed()
    }

    fn log(&self, host: &mut impl Host, line: &str) {
        host.console_output(ConsoleLevel::Log, &[line.to_string()]);
    }

    fn popup(&mut self, host: &mut impl Host, popup: Popup) {
        if self.dom.popup.show(&popup) {
            host.show_popup(&popup);
        }
    }

    fn hide_popup(&mut self, host: &mut impl Host) {
        if self.dom.popup.hide() {
            host.hide_popup();
        }
    }
}
