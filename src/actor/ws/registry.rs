//! Session registry: who is connected and how to reach them.

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use percent_encoding::percent_decode_str;
use tokio::runtime::Handle;

use super::color::ColorAssigner;
use super::session::{Session, SessionId, SessionMap};
use super::transport::{Inbound, Transport, TransportError};
use crate::reload::message::{ClientMessage, ServerMessage};

/// Inbound frames read from one session per polling pass
const MAX_FRAMES_PER_POLL: usize = 16;

/// Owns every live session.
///
/// Sessions live in a concurrent map; broadcasts iterate a snapshot so a
/// close racing a broadcast only ever costs one failed send.
pub struct SessionRegistry {
    sessions: Arc<SessionMap>,
    colors: ColorAssigner,
    next_id: AtomicU64,
    remote_logs: bool,
    runtime: Handle,
    closed: AtomicBool,
}

impl SessionRegistry {
    /// `runtime` drives delayed-send timers.
    pub fn new(runtime: Handle, remote_logs: bool) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            colors: ColorAssigner::new(),
            next_id: AtomicU64::new(1),
            remote_logs,
            runtime,
            closed: AtomicBool::new(false),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn session(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.get(&id).map(|s| Arc::clone(s.value()))
    }

    /// Greet a freshly upgraded socket and start tracking it.
    pub fn register(
        &self,
        mut transport: Box<dyn Transport>,
        remote: IpAddr,
    ) -> Result<Arc<Session>, TransportError> {
        if self.is_closed() {
            transport.close();
            return Err(TransportError::Closed);
        }

        transport.send(&ServerMessage::Connected.to_wire())?;
        if self.remote_logs {
            transport.send(&ServerMessage::InitRemoteLogs.to_wire())?;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let color = self.colors.color_for(remote);
        let session = Arc::new(Session::new(id, remote, color, transport));
        self.sessions.insert(id, Arc::clone(&session));

        // Lost a race with shutdown
        if self.is_closed() {
            self.unregister(id);
            return Err(TransportError::Closed);
        }

        crate::debug!("ws"; "session #{} from {} (total: {})", id, remote, self.len());
        Ok(session)
    }

    /// Forget a session, cancelling its pending sends. Unknown ids are fine.
    pub fn unregister(&self, id: SessionId) -> bool {
        match self.sessions.remove(&id) {
            Some((_, session)) => {
                session.close();
                crate::debug!("ws"; "session #{} closed (total: {})", id, self.len());
                true
            }
            None => false,
        }
    }

    /// Deliver to every live session. Returns how many accepted the frame.
    pub fn broadcast(&self, message: &ServerMessage) -> usize {
        let frame = message.to_wire();
        let sent = self.deliver(&frame, |_| true);
        crate::debug!("ws"; "broadcast `{}` to {} sessions", frame, sent);
        sent
    }

    /// Deliver only to sessions showing `file`.
    pub fn send_to(&self, file: &str, message: &ServerMessage) -> usize {
        let frame = message.to_wire();
        let sent = self.deliver(&frame, |s| s.associated_file() == Some(file));
        crate::debug!("ws"; "sent to {} sessions showing {}", sent, file);
        sent
    }

    /// Deliver to one session after `delay`. A session that closes first
    /// never receives it.
    pub fn send_with_delay(&self, id: SessionId, message: &ServerMessage, delay: Duration) -> bool {
        let Some(session) = self.session(id) else {
            return false;
        };
        let frame = message.to_wire();
        if delay.is_zero() {
            return match session.send(&frame) {
                Ok(()) => true,
                Err(e) => {
                    self.drop_failed(&session, &e);
                    false
                }
            };
        }
        session.schedule(&self.runtime, Arc::downgrade(&self.sessions), frame, delay)
    }

    /// `send_with_delay` for every live session.
    pub fn broadcast_with_delay(&self, message: &ServerMessage, delay: Duration) -> usize {
        self.snapshot()
            .into_iter()
            .filter(|s| self.send_with_delay(s.id(), message, delay))
            .count()
    }

    /// One non-blocking read pass over every session.
    pub fn poll(&self) {
        for session in self.snapshot() {
            for _ in 0..MAX_FRAMES_PER_POLL {
                match session.poll() {
                    Ok(Some(Inbound::Text(text))) => self.handle_frame(&session, &text),
                    Ok(Some(Inbound::Close)) | Err(TransportError::Closed) => {
                        self.unregister(session.id());
                        break;
                    }
                    Err(e) => {
                        self.drop_failed(&session, &e);
                        break;
                    }
                    Ok(None) => break,
                }
            }
        }
    }

    /// Interpret one client frame.
    pub fn handle_frame(&self, session: &Session, text: &str) {
        match ClientMessage::parse(text) {
            Ok(ClientMessage::Identify { file }) => {
                let decoded = percent_decode_str(&file)
                    .decode_utf8()
                    .map(|s| s.into_owned())
                    .unwrap_or(file);
                let decoded = decoded.trim_start_matches('/').to_string();
                if session.associate(decoded.clone()) {
                    crate::debug!("ws"; "session #{} shows {}", session.id(), decoded);
                } else {
                    crate::debug!("ws"; "session #{} already identified, ignoring {}", session.id(), decoded);
                }
            }
            Ok(ClientMessage::Console { console }) => {
                crate::logger::log_browser(
                    session.color(),
                    &session.remote().to_string(),
                    console.level,
                    &console.message.join(" "),
                );
            }
            Err(e) => {
                crate::debug!("ws"; "session #{} sent {}: {}", session.id(), e, text);
            }
        }
    }

    /// Close every session and cancel their timers. Later registrations
    /// are refused.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let ids: Vec<SessionId> = self.sessions.iter().map(|s| *s.key()).collect();
        for id in &ids {
            self.unregister(*id);
        }
        crate::debug!("ws"; "registry closed ({} sessions)", ids.len());
    }

    fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions.iter().map(|s| Arc::clone(s.value())).collect()
    }

    fn deliver(&self, frame: &str, wanted: impl Fn(&Session) -> bool) -> usize {
        let mut sent = 0;
        for session in self.snapshot() {
            if !wanted(&session) {
                continue;
            }
            match session.send(frame) {
                Ok(()) => sent += 1,
                Err(e) => self.drop_failed(&session, &e),
            }
        }
        sent
    }

    fn drop_failed(&self, session: &Session, err: &TransportError) {
        crate::debug!("ws"; "session #{} dropped: {}", session.id(), err);
        self.unregister(session.id());
    }
}
