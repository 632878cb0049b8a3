use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use notify::EventKind;
use notify::event::{CreateKind, ModifyKind, RemoveKind};
use rustc_hash::FxHashMap;

use crate::reload::classify::ChangeKind;

/// Quiet period before a path's events are released
pub(super) const DEBOUNCE_MS: u64 = 50;

/// Folds the burst of raw notify events an editor produces for one save
/// into a single change per path. Timing and dedup only; classification
/// happens downstream.
pub(super) struct Debouncer {
    pub(super) changes: FxHashMap<PathBuf, ChangeKind>,
    pub(super) last_event: Option<Instant>,
}

impl Debouncer {
    pub(super) fn new() -> Self {
        Self {
            changes: FxHashMap::default(),
            last_event: None,
        }
    }

    pub(super) fn add_event(&mut self, event: &notify::Event) {
        crate::debug!("watch"; "raw notify: {:?} {:?}", event.kind, event.paths);

        for path in &event.paths {
            let Some(kind) = change_kind(&event.kind, path) else {
                continue;
            };
            self.merge(path.clone(), kind);
            self.last_event = Some(Instant::now());
        }
    }

    /// Combine with an earlier change to the same path:
    /// - unlink then add/change: replaced in place (atomic save) → change
    /// - change then unlink → unlink
    /// - add then unlink (file or dir): never visible → dropped
    /// - anything else: first event wins
    fn merge(&mut self, path: PathBuf, kind: ChangeKind) {
        use ChangeKind::*;

        let Some(&existing) = self.changes.get(&path) else {
            self.changes.insert(path, kind);
            return;
        };

        match (existing, kind) {
            (Unlink, Add | Change) => {
                self.changes.insert(path, Change);
            }
            (UnlinkDir, AddDir) => {
                self.changes.insert(path, AddDir);
            }
            (Change, Unlink) => {
                self.changes.insert(path, Unlink);
            }
            (Add, Unlink) | (AddDir, UnlinkDir) => {
                crate::debug!("watch"; "discard transient: {}", path.display());
                self.changes.remove(&path);
            }
            _ => {}
        }
    }

    /// Settled changes ordered by path, once the quiet period has passed.
    pub(super) fn take_if_ready(&mut self) -> Option<Vec<(PathBuf, ChangeKind)>> {
        if !self.is_ready() {
            return None;
        }
        self.last_event = None;

        let mut changes: Vec<_> = std::mem::take(&mut self.changes).into_iter().collect();
        if changes.is_empty() {
            return None;
        }
        changes.sort_by(|a, b| a.0.cmp(&b.0));
        Some(changes)
    }

    pub(super) fn is_ready(&self) -> bool {
        match self.last_event {
            Some(last) => last.elapsed() >= Duration::from_millis(DEBOUNCE_MS),
            None => false,
        }
    }

    /// Sleep until the quiet period could end.
    pub(super) fn sleep_duration(&self) -> Duration {
        let Some(last) = self.last_event else {
            return Duration::from_secs(86400);
        };
        Duration::from_millis(DEBOUNCE_MS)
            .saturating_sub(last.elapsed())
            .max(Duration::from_millis(1))
    }
}

/// Map a notify event onto the watcher's five change kinds.
///
/// Metadata-only and directory-modify events carry nothing to reload.
pub(super) fn change_kind(kind: &EventKind, path: &Path) -> Option<ChangeKind> {
    let kind = match kind {
        EventKind::Create(CreateKind::Folder) => ChangeKind::AddDir,
        EventKind::Create(_) if path.is_dir() => ChangeKind::AddDir,
        EventKind::Create(_) => ChangeKind::Add,
        EventKind::Remove(RemoveKind::Folder) => ChangeKind::UnlinkDir,
        EventKind::Remove(_) => ChangeKind::Unlink,
        EventKind::Modify(ModifyKind::Metadata(_)) => return None,
        EventKind::Modify(ModifyKind::Name(_)) => {
            if path.is_dir() {
                ChangeKind::AddDir
            } else if path.exists() {
                ChangeKind::Add
            } else {
                ChangeKind::Unlink
            }
        }
        EventKind::Modify(_) if path.is_dir() => return None,
        EventKind::Modify(_) => ChangeKind::Change,
        _ => return None,
    };
    Some(kind)
}
