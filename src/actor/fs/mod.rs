//! FileSystem Actor
//!
//! Watches the project and forwards debounced changes to the Dispatcher as
//! root-relative [`ChangeEvent`]s.
//!
//! ```text
//! notify → Debouncer (timing, per-path merge) → ChangeEvent → Dispatcher
//! ```

use std::path::{Path, PathBuf};

use notify::RecommendedWatcher;
use tokio::sync::mpsc;

use super::messages::DispatchMsg;
use crate::reload::classify::ChangeEvent;

mod debouncer;
mod watch_roots;


use debouncer::Debouncer;
use watch_roots::WatchRoots;

/// FileSystem Actor - watches for file changes
pub struct FsActor {
    /// notify callback → bridge thread
    notify_rx: std::sync::mpsc::Receiver<notify::Result<notify::Event>>,
    /// Must stay alive while watching
    watcher: RecommendedWatcher,
    watch_roots: WatchRoots,
    /// Paths are reported relative to this
    root: PathBuf,
    dispatch_tx: mpsc::Sender<DispatchMsg>,
    debouncer: Debouncer,
}

impl FsActor {
    /// Start watching right away; events buffer until `run`.
    pub fn new(
        paths: Vec<PathBuf>,
        root: PathBuf,
        dispatch_tx: mpsc::Sender<DispatchMsg>,
    ) -> notify::Result<Self> {
        let (notify_tx, notify_rx) = std::sync::mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = notify_tx.send(res);
        })?;

        let mut watch_roots = WatchRoots::new(paths);
        watch_roots.attach(&mut watcher)?;
        crate::debug!("watch"; "watching {} paths", watch_roots.attached());

        Ok(Self {
            notify_rx,
            watcher,
            watch_roots,
            root,
            dispatch_tx,
            debouncer: Debouncer::new(),
        })
    }

    /// Run until the dispatcher goes away or the task is aborted.
    pub async fn run(self) {
        let Self {
            notify_rx,
            mut watcher,
            mut watch_roots,
            root,
            dispatch_tx,
            mut debouncer,
        } = self;

        let (async_tx, mut async_rx) = mpsc::channel::<notify::Event>(64);

        // notify is sync: bridge its channel into the runtime
        std::thread::spawn(move || {
            while let Ok(result) = notify_rx.recv() {
                match result {
                    Ok(event) => {
                        if async_tx.blocking_send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) => crate::log!("watch"; "notify error: {}", e),
                }
            }
        });

        crate::notice!("watch"; "ready for changes");

        loop {
            tokio::select! {
                biased;
                Some(event) = async_rx.recv() => debouncer.add_event(&event),
                _ = tokio::time::sleep(debouncer.sleep_duration()) => {
                    watch_roots.maintain(&mut watcher);
                    if forward_changes(&mut debouncer, &root, &dispatch_tx).await.is_err() {
                        break;
                    }
                }
            }
        }
    }
}

/// Send settled changes on. `Err(())` once the dispatcher is gone.
async fn forward_changes(
    debouncer: &mut Debouncer,
    root: &Path,
    dispatch_tx: &mpsc::Sender<DispatchMsg>,
) -> Result<(), ()> {
    let Some(changes) = debouncer.take_if_ready() else {
        return Ok(());
    };

    for (path, kind) in changes {
        let event = ChangeEvent::new(relative_path(root, &path), kind);
        dispatch_tx
            .send(DispatchMsg::Change(event))
            .await
            .map_err(|_| ())?;
    }
    Ok(())
}

/// `path` relative to `root` with `/` separators; paths outside the root
/// are kept whole.
pub fn relative_path(root: &Path, path: &Path) -> String {
    let Ok(rel) = path.strip_prefix(root) else {
        return path.to_string_lossy().replace('\\', "/");
    };
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
