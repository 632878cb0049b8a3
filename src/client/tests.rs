use std::time::Duration;

use super::backoff::{MAX_ATTEMPTS, MAX_STATUS_CHECKS, delay_for};
use super::*;
use crate::dom::{self, Node, Patch, PatchError};

#[derive(Debug, Clone, PartialEq)]
enum Effect {
    Timer(Timer, Duration),
    FetchStatus,
    OpenSocket,
    Send(String),
    Reload,
    Navigate(String),
    ReplaceBody(String),
    Commit(usize),
    Scroll,
    Stylesheet(usize, String),
    ShowPopup(String, PopupKind),
    HidePopup,
    LoadDiffEngine,
}

struct MockHost {
    effects: Vec<Effect>,
    console: Vec<(ConsoleLevel, Vec<String>)>,
    body: Vec<Node>,
    links: Vec<StyleLink>,
    files: Vec<String>,
    /// Fail the live commit (the trial already passed)
    fail_commit: bool,
}

impl MockHost {
    fn new(body: &str) -> Self {
        Self {
            effects: Vec::new(),
            console: Vec::new(),
            body: dom::parse_fragment(body).unwrap(),
            links: Vec::new(),
            files: vec!["index.html".into()],
            fail_commit: false,
        }
    }

    fn body_html(&self) -> String {
        self.body.iter().map(Node::to_html).collect()
    }

    fn take(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    fn count(&self, pred: impl Fn(&Effect) -> bool) -> usize {
        self.effects.iter().filter(|e| pred(e)).count()
    }
}

impl Host for MockHost {
    fn set_timer(&mut self, timer: Timer, delay: Duration) {
        self.effects.push(Effect::Timer(timer, delay));
    }
    fn fetch_status(&mut self) {
        self.effects.push(Effect::FetchStatus);
    }
    fn open_socket(&mut self) {
        self.effects.push(Effect::OpenSocket);
    }
    fn send(&mut self, frame: &str) {
        self.effects.push(Effect::Send(frame.to_string()));
    }
    fn reload(&mut self) {
        self.effects.push(Effect::Reload);
    }
    fn navigate(&mut self, url: &str) {
        self.effects.push(Effect::Navigate(url.to_string()));
    }
    fn page_files(&self) -> Vec<String> {
        self.files.clone()
    }
    fn body(&self) -> Vec<Node> {
        self.body.clone()
    }
    fn commit_body(&mut self, patches: &[Patch]) -> Result<(), PatchError> {
        if self.fail_commit {
            return Err(PatchError::MissingNode(vec![0]));
        }
        self.body = dom::apply_cloned(&self.body, patches)?;
        self.effects.push(Effect::Commit(patches.len()));
        Ok(())
    }
    fn replace_body(&mut self, html: &str) {
        self.effects.push(Effect::ReplaceBody(html.to_string()));
        if let Ok(nodes) = dom::parse_fragment(html) {
            self.body = nodes;
        }
    }
    fn scroll_to_highlight(&mut self) {
        self.effects.push(Effect::Scroll);
    }
    fn stylesheet_links(&self) -> Vec<StyleLink> {
        self.links.clone()
    }
    fn reinsert_stylesheet(&mut self, index: usize, href: &str) {
        self.effects.push(Effect::Stylesheet(index, href.to_string()));
    }
    fn now_ms(&self) -> u64 {
        42
    }
    fn show_popup(&mut self, popup: &Popup) {
        self.effects
            .push(Effect::ShowPopup(popup.message.clone(), popup.kind));
    }
    fn hide_popup(&mut self) {
        self.effects.push(Effect::HidePopup);
    }
    fn console_output(&mut self, level: ConsoleLevel, message: &[String]) {
        self.console.push((level, message.to_vec()));
    }
    fn load_diff_engine(&mut self) {
        self.effects.push(Effect::LoadDiffEngine);
    }
}

/// Engine connected to a host whose body is `body`.
fn connected(body: &str) -> (ClientEngine, MockHost) {
    let mut host = MockHost::new(body);
    let mut engine = ClientEngine::new(host.body.clone());
    engine.start(&mut host);
    engine.on_status(&mut host, StatusResponse::Status("online".into()));
    engine.on_open(&mut host);
    assert_eq!(engine.state(), ClientState::Connected);
    host.take();
    (engine, host)
}

/// Engine with the diff engine already loaded.
fn ready(body: &str) -> (ClientEngine, MockHost) {
    let (mut engine, mut host) = connected(body);
    engine.on_diff_engine_ready(&mut host);
    (engine, host)
}

fn hot(body: &str) -> String {
    serde_json::json!({ "body": body, "hot": true }).to_string()
}

// =============================================================================
// Status checks
// =============================================================================

#[test]
fn test_status_online_connects_and_identifies() {
    let mut host = MockHost::new("");
    let mut engine = ClientEngine::new(Vec::new());
    engine.start(&mut host);
    assert_eq!(engine.state(), ClientState::StatusChecking);
    engine.on_status(&mut host, StatusResponse::Status("online".into()));
    engine.on_open(&mut host);
    assert_eq!(
        host.take(),
        vec![
            Effect::FetchStatus,
            Effect::OpenSocket,
            Effect::Send(r#"{"file":"index.html"}"#.into()),
        ]
    );
}

#[test]
fn test_status_failures_give_up_with_single_reload() {
    let mut host = MockHost::new("");
    let mut engine = ClientEngine::new(Vec::new());
    engine.start(&mut host);

    for _ in 0..MAX_STATUS_CHECKS {
        engine.on_status(&mut host, StatusResponse::Failed);
        engine.on_timer(&mut host, Timer::StatusRetry);
    }
    assert_eq!(engine.state(), ClientState::GivenUp);

    let effects = host.take();
    let reloads: Vec<_> = effects
        .iter()
        .filter(|e| matches!(e, Effect::Timer(Timer::ForcedReload, _)))
        .collect();
    assert_eq!(
        reloads,
        vec![&Effect::Timer(Timer::ForcedReload, Duration::from_millis(5000))]
    );
    // Initial check plus one per retry before the last failure
    let checks = effects.iter().filter(|e| **e == Effect::FetchStatus).count();
    assert_eq!(checks, MAX_STATUS_CHECKS as usize);

    // No more polling after giving up
    engine.on_status(&mut host, StatusResponse::Failed);
    engine.on_timer(&mut host, Timer::StatusRetry);
    assert!(host.take().is_empty());

    engine.on_timer(&mut host, Timer::ForcedReload);
    assert_eq!(host.take(), vec![Effect::Reload]);
}

#[test]
fn test_non_online_status_retries() {
    let mut host = MockHost::new("");
    let mut engine = ClientEngine::new(Vec::new());
    engine.start(&mut host);
    engine.on_status(&mut host, StatusResponse::Status("starting".into()));
    assert_eq!(engine.attempts().status_check_count, 1);
    engine.on_timer(&mut host, Timer::StatusRetry);
    engine.on_status(&mut host, StatusResponse::Status("online".into()));
    assert_eq!(engine.attempts().status_check_count, 0);
    assert_eq!(engine.state(), ClientState::Connecting);
}

// =============================================================================
// Reconnect
// =============================================================================

#[test]
fn test_backoff_sequence_and_give_up() {
    let (mut engine, mut host) = connected("");

    for k in 0..MAX_ATTEMPTS {
        engine.on_close(&mut host);
        assert_eq!(engine.state(), ClientState::Reconnecting);
        let effects = host.take();
        assert!(
            effects.contains(&Effect::Timer(Timer::Reconnect, delay_for(k))),
            "attempt {k}: {effects:?}"
        );
        engine.on_timer(&mut host, Timer::Reconnect);
        assert_eq!(host.take(), vec![Effect::OpenSocket]);
    }

    engine.on_close(&mut host);
    assert_eq!(engine.state(), ClientState::GivenUp);
    let effects = host.take();
    assert!(!effects.iter().any(|e| matches!(e, Effect::Timer(Timer::Reconnect, _))));
    assert!(effects.contains(&Effect::Timer(Timer::ForcedReload, Duration::from_millis(5000))));

    // Closed for good
    engine.on_close(&mut host);
    assert!(host.take().is_empty());
}

#[test]
fn test_successful_reconnect_forces_reload() {
    let (mut engine, mut host) = connected("");
    engine.on_close(&mut host);
    engine.on_timer(&mut host, Timer::Reconnect);
    host.take();
    engine.on_open(&mut host);
    assert_eq!(host.take(), vec![Effect::Reload]);
}

#[test]
fn test_message_resets_backoff() {
    let (mut engine, mut host) = connected("");
    engine.on_close(&mut host);
    engine.on_close(&mut host);
    assert_eq!(engine.attempts().attempt_count, 2);
    engine.on_message(&mut host, "connected");
    assert_eq!(engine.attempts().attempt_count, 0);
    assert_eq!(engine.attempts().backoff_ms, 1000);
}

#[test]
fn test_lost_connection_notice() {
    let (mut engine, mut host) = connected("");
    engine.on_close(&mut host);
    assert!(host.take().contains(&Effect::Timer(
        Timer::LostConnectionNotice,
        Duration::from_millis(300)
    )));
    engine.on_timer(&mut host, Timer::LostConnectionNotice);
    engine.on_timer(&mut host, Timer::LostConnectionNotice);
    assert_eq!(
        host.take(),
        vec![Effect::ShowPopup(
            "lost connection to dev server".into(),
            PopupKind::Error
        )]
    );
}

// =============================================================================
// Plain frames
// =============================================================================

#[test]
fn test_plain_frames() {
    let (mut engine, mut host) = connected("");
    host.links = vec![
        StyleLink {
            href: "/a.css".into(),
            rel: "stylesheet".into(),
        },
        StyleLink {
            href: "/icon.png".into(),
            rel: "icon".into(),
        },
        StyleLink {
            href: "/b.css?v=1".into(),
            rel: "stylesheet".into(),
        },
    ];

    engine.on_message(&mut host, "refreshcss");
    assert_eq!(
        host.take(),
        vec![
            Effect::Stylesheet(0, "/a.css?_reload=42".into()),
            Effect::Stylesheet(2, "/b.css?v=1&_reload=42".into()),
            Effect::ShowPopup("css updated".into(), PopupKind::Info),
        ]
    );

    engine.on_message(&mut host, "refreshcss-silent");
    assert_eq!(host.count(|e| matches!(e, Effect::ShowPopup(..))), 0);
    assert_eq!(host.take().len(), 2);

    engine.on_message(&mut host, "reload");
    assert_eq!(host.take(), vec![Effect::Reload]);

    engine.on_message(&mut host, "connected");
    assert_eq!(
        host.take(),
        vec![Effect::ShowPopup("connected".into(), PopupKind::Success)]
    );
}

#[test]
fn test_remote_logs_forwarding() {
    let (mut engine, mut host) = connected("");
    let args = vec!["hi".to_string()];

    engine.console(&mut host, ConsoleLevel::Log, &args);
    assert!(host.take().is_empty());

    engine.on_message(&mut host, "initRemoteLogs");
    assert!(engine.remote_logs_installed());
    engine.console(&mut host, ConsoleLevel::Warn, &args);
    assert_eq!(
        host.take(),
        vec![Effect::Send(r#"{"console":{"type":"warn","message":["hi"]}}"#.into())]
    );
    // Original output always happens
    assert_eq!(host.console.iter().filter(|(_, m)| m == &args).count(), 2);

    engine.on_close(&mut host);
    host.take();
    engine.console(&mut host, ConsoleLevel::Error, &args);
    assert!(!host.take().iter().any(|e| matches!(e, Effect::Send(_))));
}

#[test]
fn test_structured_payload_fields() {
    let (mut engine, mut host) = connected("<p>old</p>");
    engine.on_message(
        &mut host,
        r#"{"navigate":"/next.html","body":"<p>new</p>","messages":["1:1 a","2:2 b"]}"#,
    );
    assert_eq!(
        host.take(),
        vec![
            Effect::Navigate("/next.html".into()),
            Effect::ReplaceBody("<p>new</p>".into()),
            Effect::ShowPopup("1:1 a\n\n2:2 b".into(), PopupKind::Info),
        ]
    );
    assert_eq!(host.body_html(), "<p>new</p>");

    engine.on_message(&mut host, r#"{"message":"HIDE_MESSAGES"}"#);
    assert_eq!(host.take(), vec![Effect::HidePopup]);
    engine.on_message(&mut host, r#"{"message":"HIDE"}"#);
    assert!(host.take().is_empty());
}

#[test]
fn test_garbage_frame_is_logged_not_fatal() {
    let (mut engine, mut host) = connected("");
    engine.on_message(&mut host, "{not json");
    assert!(host.take().is_empty());
    assert_eq!(host.console.last().map(|(l, _)| *l), Some(ConsoleLevel::Error));
    assert_eq!(engine.state(), ClientState::Connected);
}

// =============================================================================
// Hot-body transaction
// =============================================================================

#[test]
fn test_diff_engine_loads_lazily_and_applies_newest_body() {
    let (mut engine, mut host) = connected("<p>a</p>");
    engine.on_message(&mut host, &hot("<p>b</p>"));
    engine.on_message(&mut host, &hot("<p>c</p>"));
    assert_eq!(engine.dom().diff_engine, DiffEngineStatus::Loading);
    assert_eq!(host.take(), vec![Effect::LoadDiffEngine]);
    assert_eq!(host.body_html(), "<p>a</p>");

    engine.on_diff_engine_ready(&mut host);
    assert_eq!(host.body_html(), "<p>c</p>");
    assert_eq!(host.take(), vec![Effect::Commit(1)]);
}

#[test]
fn test_hot_patch_applies_and_advances_snapshot() {
    let (mut engine, mut host) = ready("<h1>Title</h1><p>one</p>");
    engine.on_message(&mut host, &hot("<h1>Title</h1><p>two</p><p>three</p>"));
    assert_eq!(host.body_html(), "<h1>Title</h1><p>two</p><p>three</p>");
    let snapshot: String = engine.dom().snapshot.iter().map(Node::to_html).collect();
    assert_eq!(snapshot, "<h1>Title</h1><p>two</p><p>three</p>");
}

#[test]
fn test_hot_patch_idempotent() {
    let (mut engine, mut host) = ready("<p>a</p>");
    engine.on_message(&mut host, &hot("<p>b</p>"));
    assert_eq!(host.take(), vec![Effect::Commit(1)]);
    engine.on_message(&mut host, &hot("<p>b</p>"));
    assert!(host.take().is_empty());
    assert_eq!(host.body_html(), "<p>b</p>");
}

#[test]
fn test_invalid_body_leaves_page_untouched() {
    let (mut engine, mut host) = ready("<main><p>keep</p></main>");
    let before = host.body_html();

    for _ in 0..3 {
        engine.on_message(&mut host, &hot("<main><p>broken</main></div>"));
    }
    assert_eq!(host.body_html(), before);
    assert!(engine.dom().last_diff_error);
    let effects = host.take();
    assert_eq!(
        effects,
        vec![Effect::ShowPopup(
            engine::DIFF_ERROR_MSG.into(),
            PopupKind::Error
        )]
    );
    let snapshot: String = engine.dom().snapshot.iter().map(Node::to_html).collect();
    assert_eq!(snapshot, before);

    // Next good patch clears the notification
    engine.on_message(&mut host, &hot("<main><p>fixed</p></main>"));
    assert_eq!(host.body_html(), "<main><p>fixed</p></main>");
    assert!(!engine.dom().last_diff_error);
    assert_eq!(host.take(), vec![Effect::Commit(1), Effect::HidePopup]);
}

#[test]
fn test_failed_trial_leaves_page_untouched() {
    // Live page drifted from the snapshot: the trial patch cannot apply
    let (mut engine, mut host) = ready("<ul><li>a</li><li>b</li></ul>");
    host.body = dom::parse_fragment("<p>scripted</p>").unwrap();

    engine.on_message(&mut host, &hot("<ul><li>a</li><li>c</li></ul>"));
    assert_eq!(host.body_html(), "<p>scripted</p>");
    assert!(engine.dom().last_diff_error);
    assert!(!host.take().iter().any(|e| matches!(e, Effect::Commit(_))));
}

#[test]
fn test_failed_commit_keeps_snapshot() {
    let (mut engine, mut host) = ready("<p>a</p>");
    host.fail_commit = true;
    engine.on_message(&mut host, &hot("<p>b</p>"));
    let snapshot: String = engine.dom().snapshot.iter().map(Node::to_html).collect();
    assert_eq!(snapshot, "<p>a</p>");
    assert!(engine.dom().last_diff_error);
}

#[test]
fn test_highlight_scrolls_into_view() {
    let (mut engine, mut host) = ready("<p>a</p>");
    engine.on_message(&mut host, &hot(r#"<p data-highlight="true">b</p>"#));
    assert!(host.take().contains(&Effect::Scroll));
}
