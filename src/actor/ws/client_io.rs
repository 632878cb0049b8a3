use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use super::SessionRegistry;

/// Pause between read passes over all sessions
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Background thread reading client frames (non-blocking poll).
///
/// Exits once the registry is shut down.
pub(super) fn spawn_reader(registry: Arc<SessionRegistry>) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("relive-ws-reader".into())
        .spawn(move || {
            while !registry.is_closed() {
                registry.poll();
                std::thread::sleep(POLL_INTERVAL);
            }
            crate::debug!("ws"; "reader stopped");
        })
}
