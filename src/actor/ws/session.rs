//! One connected browser tab.

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::color::ColorTag;
use super::transport::{Inbound, Transport, TransportError};

pub type SessionId = u64;

/// Live sessions by id, shared between the registry and outbox tasks
pub(super) type SessionMap = DashMap<SessionId, Arc<Session>>;

/// A live socket plus what the registry knows about it.
///
/// Delayed sends go through a per-session outbox task that holds one timer
/// at a time. Each queued frame keeps its own due time, so frames fire
/// independently and are never merged.
pub struct Session {
    id: SessionId,
    remote: IpAddr,
    color: ColorTag,
    /// File the page reported first; never changes afterwards
    associated_file: OnceLock<String>,
    transport: Mutex<Box<dyn Transport>>,
    outbox: Mutex<Option<Outbox>>,
    /// Delayed frames not yet fired
    pending: AtomicUsize,
    closed: AtomicBool,
}

struct Outbox {
    tx: mpsc::UnboundedSender<Delayed>,
    task: JoinHandle<()>,
}

struct Delayed {
    frame: String,
    due: Instant,
}

impl Session {
    pub(super) fn new(
        id: SessionId,
        remote: IpAddr,
        color: ColorTag,
        transport: Box<dyn Transport>,
    ) -> Self {
        Self {
            id,
            remote,
            color,
            associated_file: OnceLock::new(),
            transport: Mutex::new(transport),
            outbox: Mutex::new(None),
            pending: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn remote(&self) -> IpAddr {
        self.remote
    }

    pub fn color(&self) -> ColorTag {
        self.color
    }

    pub fn associated_file(&self) -> Option<&str> {
        self.associated_file.get().map(String::as_str)
    }

    /// Record the page's file. Only the first call takes effect.
    pub(super) fn associate(&self, file: String) -> bool {
        self.associated_file.set(file).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn send(&self, frame: &str) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.transport.lock().send(frame)
    }

    pub(super) fn poll(&self) -> Result<Option<Inbound>, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.transport.lock().poll()
    }

    /// Queue `frame` for delivery after `delay`. False once closed.
    ///
    /// A failed delayed send removes the session from `sessions`.
    pub(super) fn schedule(
        self: &Arc<Self>,
        runtime: &Handle,
        sessions: Weak<SessionMap>,
        frame: String,
        delay: Duration,
    ) -> bool {
        let mut outbox = self.outbox.lock();
        if self.is_closed() {
            return false;
        }
        let outbox =
            outbox.get_or_insert_with(|| Outbox::spawn(runtime, Arc::downgrade(self), sessions));
        let due = Instant::now() + delay;
        self.pending.fetch_add(1, Ordering::SeqCst);
        if outbox.tx.send(Delayed { frame, due }).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return false;
        }
        true
    }

    /// Cancel pending frames and close the socket. Idempotent.
    pub(super) fn close(&self) {
        let outbox = {
            let mut outbox = self.outbox.lock();
            if self.closed.swap(true, Ordering::SeqCst) {
                return;
            }
            outbox.take()
        };
        if let Some(outbox) = outbox {
            outbox.task.abort();
        }
        self.pending.store(0, Ordering::SeqCst);
        self.transport.lock().close();
    }
}

impl Outbox {
    fn spawn(runtime: &Handle, session: Weak<Session>, sessions: Weak<SessionMap>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Delayed>();
        let task = runtime.spawn(async move {
            while let Some(Delayed { frame, due }) = rx.recv().await {
                tokio::time::sleep_until(due).await;
                let Some(session) = session.upgrade() else {
                    break;
                };
                if session.is_closed() {
                    break;
                }
                session.pending.fetch_sub(1, Ordering::SeqCst);
                if let Err(e) = session.send(&frame) {
                    crate::debug!("ws"; "session #{} dropped: delayed send failed: {}", session.id, e);
                    if let Some(sessions) = sessions.upgrade() {
                        sessions.remove(&session.id);
                    }
                    session.close();
                    break;
                }
            }
        });
        Self { tx, task }
    }
}
