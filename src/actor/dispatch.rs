//! Dispatcher
//!
//! Turns classified changes into session commands, routing HTML/PHP
//! hot-body candidates through the worker pool.
//!
//! | Intent               | Action                                           |
//! |----------------------|--------------------------------------------------|
//! | `CssRefresh[Silent]` | delayed broadcast `refreshcss[-silent]`          |
//! | `FullReload`         | delayed broadcast `reload`                       |
//! | `HotBodyCandidate`   | read file, submit to the pool                    |
//! | `Ignored`            | nothing                                          |
//!
//! Pool results are keyed by file: only the newest task per file counts.
//! A valid result hot-patches sessions showing the file, an invalid one shows
//! its diagnostics there, and the next valid result clears them.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;
use tokio::sync::mpsc;

use super::messages::{DispatchMsg, WsMsg};
use crate::pool::{ResultHandler, TaskId, TaskOutcome, WorkerError, WorkerPool, WorkerTask};
use crate::reload::classify::{ChangeEvent, ChangeKind, ClassifyOptions, IntentKind, classify};
use crate::reload::message::{CursorPosition, ServerMessage, UpdatePayload};

/// The session actor stopped; nothing more can be delivered.
#[derive(Debug, Error)]
#[error("session actor stopped")]
pub struct Disconnected;

#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
    pub classify: ClassifyOptions,
    /// Project root that change paths are relative to
    pub root: PathBuf,
    /// Per-session delay for reload and stylesheet broadcasts
    pub wait: Duration,
    /// Mark the element under an editor cursor
    pub highlight: bool,
}

pub struct Dispatcher {
    rx: mpsc::Receiver<DispatchMsg>,
    outcomes: mpsc::UnboundedReceiver<TaskOutcome>,
    ws_tx: mpsc::Sender<WsMsg>,
    pool: Arc<WorkerPool>,
    options: DispatchOptions,
    /// Newest accepted task per file
    latest: FxHashMap<String, TaskId>,
    /// Files whose last result failed validation
    invalid: FxHashSet<String>,
}

impl Dispatcher {
    pub fn new(
        rx: mpsc::Receiver<DispatchMsg>,
        outcomes: mpsc::UnboundedReceiver<TaskOutcome>,
        ws_tx: mpsc::Sender<WsMsg>,
        pool: Arc<WorkerPool>,
        options: DispatchOptions,
    ) -> Self {
        Self {
            rx,
            outcomes,
            ws_tx,
            pool,
            options,
            latest: FxHashMap::default(),
            invalid: FxHashSet::default(),
        }
    }

    /// Pool callback feeding outcomes back into a dispatcher.
    pub fn result_handler(tx: mpsc::UnboundedSender<TaskOutcome>) -> ResultHandler {
        Arc::new(move |outcome| {
            let _ = tx.send(outcome);
        })
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                msg = self.rx.recv() => {
                    let result = match msg {
                        Some(DispatchMsg::Shutdown(ack)) => {
                            crate::debug!("dispatch"; "shutting down");
                            let _ = ack.send(());
                            break;
                        }
                        Some(msg) => self.handle(msg).await,
                        None => break,
                    };
                    if result.is_err() {
                        break;
                    }
                }
                Some(outcome) = self.outcomes.recv() => {
                    if self.on_outcome(outcome).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    async fn handle(&mut self, msg: DispatchMsg) -> Result<(), Disconnected> {
        match msg {
            DispatchMsg::Change(event) => self.on_change(event).await,
            DispatchMsg::EditorBuffer {
                file_name,
                text,
                cursor,
            } => {
                self.on_editor_buffer(file_name, text, cursor);
                Ok(())
            }
            DispatchMsg::Navigate { url } => self.on_navigate(url).await,
            DispatchMsg::Shutdown(ack) => {
                let _ = ack.send(());
                Ok(())
            }
        }
    }

    pub async fn on_change(&mut self, event: ChangeEvent) -> Result<(), Disconnected> {
        let intent = classify(&event, &self.options.classify);
        match intent.kind {
            IntentKind::Ignored => {
                crate::debug!("watch"; "ignored {} {}", event.kind.label(), intent.path);
                Ok(())
            }
            IntentKind::CssRefresh | IntentKind::CssRefreshSilent => {
                crate::notice!("css"; "change detected {}", intent.path);
                let message = if intent.kind == IntentKind::CssRefresh {
                    ServerMessage::RefreshCss
                } else {
                    ServerMessage::RefreshCssSilent
                };
                self.broadcast(message, Some(self.options.wait)).await
            }
            IntentKind::FullReload => {
                crate::notice!("watch"; "change detected {}", intent.path);
                self.broadcast(ServerMessage::Reload, Some(self.options.wait)).await
            }
            IntentKind::HotBodyCandidate => {
                crate::notice!("watch"; "change detected {}", intent.path);
                let full = self.options.root.join(&intent.path);
                match tokio::fs::read_to_string(&full).await {
                    Ok(text) => {
                        self.submit(WorkerTask::new(intent.path, text));
                        Ok(())
                    }
                    Err(e) => {
                        crate::debug!("watch"; "cannot read {}: {}, reloading", full.display(), e);
                        self.broadcast(ServerMessage::Reload, Some(self.options.wait)).await
                    }
                }
            }
        }
    }

    /// Unsaved editor contents: hot-body path without touching disk.
    pub fn on_editor_buffer(&mut self, file_name: String, text: String, cursor: Option<CursorPosition>) {
        let event = ChangeEvent::new(file_name.as_str(), ChangeKind::Change);
        if classify(&event, &self.options.classify).kind != IntentKind::HotBodyCandidate {
            crate::debug!("dispatch"; "editor buffer {} is not a hot-body file", file_name);
            return;
        }

        let mut task = WorkerTask::new(file_name, text);
        if self.options.highlight
            && let Some(cursor) = cursor
        {
            task = task.with_cursor(cursor);
        }
        self.submit(task);
    }

    pub async fn on_navigate(&mut self, url: String) -> Result<(), Disconnected> {
        crate::debug!("dispatch"; "navigate to {}", url);
        self.broadcast(ServerMessage::Update(UpdatePayload::navigate(url)), None)
            .await
    }

    pub async fn on_outcome(&mut self, outcome: TaskOutcome) -> Result<(), Disconnected> {
        let TaskOutcome {
            id,
            file_name,
            result,
        } = outcome;

        if self.latest.get(&file_name) != Some(&id) {
            crate::debug!("dispatch"; "stale result #{} for {}", id, file_name);
            return Ok(());
        }
        self.latest.remove(&file_name);

        let result = match result {
            Ok(result) => result,
            Err(WorkerError::Cancelled) => {
                crate::debug!("pool"; "{} cancelled", file_name);
                return Ok(());
            }
            Err(e) => {
                crate::log!("pool"; "{}: {}", file_name, e);
                return Ok(());
            }
        };

        if result.ignore {
            crate::debug!("pool"; "{} has no body, skipped", file_name);
            return Ok(());
        }

        if result.report.valid {
            if self.invalid.remove(&file_name) {
                self.send_to(&file_name, UpdatePayload::hide_messages()).await?;
            }
            crate::logger::status_patched(&file_name);
            self.send_to(&file_name, UpdatePayload::hot_body(result.body))
                .await
        } else {
            self.invalid.insert(file_name.clone());
            crate::logger::status_invalid(&file_name, &result.report.messages);
            self.send_to(&file_name, UpdatePayload::messages(result.report.messages))
                .await
        }
    }

    fn submit(&mut self, task: WorkerTask) {
        let file_name = task.file_name.clone();
        match self.pool.submit(task) {
            Ok(id) => {
                self.latest.insert(file_name, id);
            }
            Err(e) => {
                crate::log!("pool"; "dropped update for {}: {}", file_name, e);
            }
        }
    }

    async fn broadcast(&self, message: ServerMessage, delay: Option<Duration>) -> Result<(), Disconnected> {
        self.ws_tx
            .send(WsMsg::Broadcast { message, delay })
            .await
            .map_err(|_| Disconnected)
    }

    async fn send_to(&self, file: &str, payload: UpdatePayload) -> Result<(), Disconnected> {
        self.ws_tx
            .send(WsMsg::SendTo {
                file: file.to_string(),
                message: ServerMessage::Update(payload),
            })
            .await
            .map_err(|_| Disconnected)
    }
}
