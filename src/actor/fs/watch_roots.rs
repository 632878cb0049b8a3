use std::path::PathBuf;

use notify::{RecursiveMode, Watcher};
use rustc_hash::FxHashSet;

/// Keeps the configured watch paths attached, re-attaching any that were
/// deleted and recreated while serving.
pub(super) struct WatchRoots {
    wanted: Vec<PathBuf>,
    attached: FxHashSet<PathBuf>,
}

impl WatchRoots {
    pub(super) fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            wanted: paths,
            attached: FxHashSet::default(),
        }
    }

    /// Attach every wanted path that exists now.
    pub(super) fn attach(&mut self, watcher: &mut impl Watcher) -> notify::Result<()> {
        for path in self.wanted.iter().filter(|p| p.exists()) {
            watcher.watch(path, RecursiveMode::Recursive)?;
            self.attached.insert(path.clone());
        }
        Ok(())
    }

    pub(super) fn maintain(&mut self, watcher: &mut impl Watcher) {
        self.attached.retain(|path| path.exists());

        for path in &self.wanted {
            if self.attached.contains(path) || !path.exists() {
                continue;
            }
            if watcher.watch(path, RecursiveMode::Recursive).is_ok() {
                crate::debug!("watch"; "re-attached {}", path.display());
                self.attached.insert(path.clone());
            }
        }
    }

    pub(super) fn attached(&self) -> usize {
        self.attached.len()
    }
}
