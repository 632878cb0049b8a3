use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;

use super::*;
use crate::actor::messages::WsMsg;
use crate::reload::message::{ServerMessage, UpdatePayload};

/// Shared view of an in-memory socket
#[derive(Clone, Default)]
struct Wire {
    sent: Arc<Mutex<Vec<String>>>,
    inbound: Arc<Mutex<VecDeque<Inbound>>>,
    fail: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl Wire {
    fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    fn push(&self, frame: &str) {
        self.inbound.lock().push_back(Inbound::Text(frame.to_string()));
    }

    fn transport(&self) -> Box<dyn Transport> {
        Box::new(MemoryTransport(self.clone()))
    }
}

struct MemoryTransport(Wire);

impl Transport for MemoryTransport {
    fn send(&mut self, frame: &str) -> Result<(), TransportError> {
        if self.0.fail.load(Ordering::SeqCst) || self.0.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.0.sent.lock().push(frame.to_string());
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<Inbound>, TransportError> {
        Ok(self.0.inbound.lock().pop_front())
    }

    fn close(&mut self) {
        self.0.closed.store(true, Ordering::SeqCst);
    }
}

fn ip(last: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(192, 168, 0, last))
}

fn registry() -> SessionRegistry {
    SessionRegistry::new(Handle::current(), false)
}

/// Register a session and clear its greeting.
fn join(registry: &SessionRegistry, last: u8) -> (Arc<Session>, Wire) {
    let wire = Wire::default();
    let session = registry.register(wire.transport(), ip(last)).unwrap();
    wire.sent.lock().clear();
    (session, wire)
}

// =============================================================================
// Registration
// =============================================================================

#[tokio::test]
async fn test_register_greets() {
    let registry = registry();
    let wire = Wire::default();
    registry.register(wire.transport(), ip(1)).unwrap();
    assert_eq!(wire.sent(), vec!["connected"]);
    assert_eq!(registry.len(), 1);

    let registry = SessionRegistry::new(Handle::current(), true);
    let wire = Wire::default();
    registry.register(wire.transport(), ip(1)).unwrap();
    assert_eq!(wire.sent(), vec!["connected", "initRemoteLogs"]);
}

#[tokio::test]
async fn test_failed_greeting_not_registered() {
    let registry = registry();
    let wire = Wire::default();
    wire.fail.store(true, Ordering::SeqCst);
    assert!(registry.register(wire.transport(), ip(1)).is_err());
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_sessions_share_color_per_address() {
    let registry = registry();
    let (a, _) = join(&registry, 1);
    let (b, _) = join(&registry, 1);
    let (c, _) = join(&registry, 2);
    assert_ne!(a.id(), b.id());
    assert_eq!(a.color(), b.color());
    assert_ne!(a.color(), c.color());
}

// =============================================================================
// Delivery
// =============================================================================

#[tokio::test]
async fn test_broadcast_isolates_failures() {
    let registry = registry();
    let (_, a) = join(&registry, 1);
    let (bad, b) = join(&registry, 2);
    let (_, c) = join(&registry, 3);
    b.fail.store(true, Ordering::SeqCst);

    assert_eq!(registry.broadcast(&ServerMessage::Reload), 2);
    assert_eq!(a.sent(), vec!["reload"]);
    assert_eq!(c.sent(), vec!["reload"]);
    assert!(registry.session(bad.id()).is_none());
    assert_eq!(registry.len(), 2);
}

#[tokio::test]
async fn test_send_to_targets_associated_file() {
    let registry = registry();
    let (index, index_wire) = join(&registry, 1);
    let (about, about_wire) = join(&registry, 2);
    let (_, anon_wire) = join(&registry, 3);

    index_wire.push(r#"{"file":"index.html"}"#);
    about_wire.push(r#"{"file":"/about%20us.html"}"#);
    registry.poll();
    assert_eq!(index.associated_file(), Some("index.html"));
    assert_eq!(about.associated_file(), Some("about us.html"));

    let message = ServerMessage::Update(UpdatePayload::messages(vec!["1:1 oops".into()]));
    assert_eq!(registry.send_to("index.html", &message), 1);
    assert_eq!(index_wire.sent(), vec![r#"{"messages":["1:1 oops"]}"#]);
    assert!(about_wire.sent().is_empty());
    assert!(anon_wire.sent().is_empty());

    // Broadcast ignores association
    assert_eq!(registry.broadcast(&ServerMessage::Reload), 3);
}

#[tokio::test]
async fn test_association_set_once() {
    let registry = registry();
    let (session, wire) = join(&registry, 1);
    wire.push(r#"{"file":"a.html"}"#);
    wire.push(r#"{"file":"b.html"}"#);
    registry.poll();
    assert_eq!(session.associated_file(), Some("a.html"));
}

#[tokio::test]
async fn test_console_and_garbage_frames_keep_session() {
    let registry = registry();
    let (session, wire) = join(&registry, 1);
    wire.push(r#"{"console":{"type":"warn","message":["careful"]}}"#);
    wire.push("not json");
    wire.push(r#"[1,2]"#);
    registry.poll();
    assert!(registry.session(session.id()).is_some());
    assert_eq!(session.associated_file(), None);
}

#[tokio::test]
async fn test_close_frame_unregisters() {
    let registry = registry();
    let (session, wire) = join(&registry, 1);
    wire.inbound.lock().push_back(Inbound::Close);
    registry.poll();
    assert!(registry.session(session.id()).is_none());
    assert!(wire.closed.load(Ordering::SeqCst));
}

// =============================================================================
// Delayed sends
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_delayed_send_fires_after_delay() {
    let registry = registry();
    let (session, wire) = join(&registry, 1);

    assert!(registry.send_with_delay(session.id(), &ServerMessage::Reload, Duration::from_millis(100)));
    assert_eq!(session.pending(), 1);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(wire.sent().is_empty());

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(wire.sent(), vec!["reload"]);
    assert_eq!(session.pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_delayed_sends_are_not_coalesced() {
    let registry = registry();
    let (_, a) = join(&registry, 1);
    let (_, b) = join(&registry, 2);
    let wait = Duration::from_millis(100);

    for _ in 0..3 {
        assert_eq!(registry.broadcast_with_delay(&ServerMessage::RefreshCss, wait), 2);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    // One frame per scheduled send, duplicates included
    assert_eq!(a.sent(), vec!["refreshcss"; 3]);
    assert_eq!(b.sent(), vec!["refreshcss"; 3]);
}

#[tokio::test(start_paused = true)]
async fn test_failed_delayed_send_unregisters() {
    let registry = registry();
    let (session, wire) = join(&registry, 1);
    let (_, healthy) = join(&registry, 2);

    assert_eq!(
        registry.broadcast_with_delay(&ServerMessage::Reload, Duration::from_millis(100)),
        2
    );
    wire.fail.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(registry.len(), 1);
    assert!(registry.session(session.id()).is_none());
    assert!(session.is_closed());
    assert!(wire.closed.load(Ordering::SeqCst));
    assert_eq!(healthy.sent(), vec!["reload"]);
}

#[tokio::test(start_paused = true)]
async fn test_close_before_timer_skips_send() {
    let registry = registry();
    let (session, wire) = join(&registry, 1);
    registry.send_with_delay(session.id(), &ServerMessage::Reload, Duration::from_millis(100));

    assert!(registry.unregister(session.id()));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(wire.sent().is_empty());
    assert_eq!(session.pending(), 0);

    // Unknown session: nothing scheduled, no error
    assert!(!registry.send_with_delay(session.id(), &ServerMessage::Reload, Duration::from_millis(1)));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_closes_and_drains() {
    let registry = registry();
    let (a, a_wire) = join(&registry, 1);
    let (b, b_wire) = join(&registry, 2);
    registry.broadcast_with_delay(&ServerMessage::Reload, Duration::from_millis(100));
    assert_eq!(a.pending() + b.pending(), 2);

    registry.shutdown();
    assert!(registry.is_empty());
    assert!(a_wire.closed.load(Ordering::SeqCst));
    assert!(b_wire.closed.load(Ordering::SeqCst));
    assert_eq!(a.pending() + b.pending(), 0);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(a_wire.sent().is_empty());
    assert!(b_wire.sent().is_empty());

    let late = Wire::default();
    assert!(registry.register(late.transport(), ip(3)).is_err());
    assert!(late.closed.load(Ordering::SeqCst));
}

// =============================================================================
// Actor
// =============================================================================

#[tokio::test]
async fn test_actor_routes_and_shuts_down() {
    let registry = Arc::new(registry());
    let (tx, rx) = tokio::sync::mpsc::channel(8);
    let handle = tokio::spawn(WsActor::new(rx, Arc::clone(&registry)).run());

    let wire = Wire::default();
    tx.send(WsMsg::AddClient {
        transport: wire.transport(),
        remote: ip(1),
    })
    .await
    .unwrap();
    tx.send(WsMsg::Broadcast {
        message: ServerMessage::Reload,
        delay: None,
    })
    .await
    .unwrap();

    let (ack_tx, ack_rx) = tokio::sync::oneshot::channel();
    tx.send(WsMsg::Shutdown(ack_tx)).await.unwrap();
    ack_rx.await.unwrap();
    handle.await.unwrap();

    assert_eq!(wire.sent(), vec!["connected", "reload"]);
    assert!(registry.is_closed());
    assert!(wire.closed.load(Ordering::SeqCst));
}
