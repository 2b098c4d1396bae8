//! Bridge from `notify` filesystem events to [`ChangeEvent`]s.
//!
//! The watcher callback only translates and forwards. All index mutation
//! happens on the updater thread that owns the receiving end.

use crossbeam_channel::Sender;
use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};

use crate::SNAPSHOT_NAME;
use crate::error::Result;
use crate::snapshot::SnapshotFiles;
use crate::updater::{ChangeEvent, ChangeKind};

/// Start watching `root` recursively, forwarding translated events to
/// `events`.
///
/// Events touching `snapshot`, the default snapshot in `root`, or their
/// staging and sidecar files are dropped.
///
/// The returned watcher must be kept alive; dropping it stops the stream.
///
/// # Errors
/// Returns `IndexerError::Watch` if the platform watcher cannot be created
/// or cannot watch `root`.
pub fn watch(
    root: &Path,
    snapshot: &Path,
    events: Sender<ChangeEvent>,
) -> Result<RecommendedWatcher> {
    let snapshot_files = SnapshotFiles::default().with(&root.join(SNAPSHOT_NAME)).with(snapshot);
    let handler = move |result: notify::Result<Event>| match result {
        Ok(event) => {
            if touches_snapshot(&event, &snapshot_files) {
                return;
            }
            for change in translate(&event) {
                if events.send(change).is_err() {
                    // Updater is gone; nothing left to feed.
                    return;
                }
            }
        }
        Err(e) => tracing::warn!(error = %e, "Filesystem watcher error"),
    };
    let mut watcher = notify::recommended_watcher(handler)?;

    watcher.watch(root, RecursiveMode::Recursive)?;
    tracing::info!(root = %root.display(), "Watching for filesystem changes");
    Ok(watcher)
}

fn touches_snapshot(event: &Event, snapshot_files: &SnapshotFiles) -> bool {
    event.paths.iter().any(|path| snapshot_files.contains(path))
}

/// Translate one `notify` event into zero or more change events.
///
/// Access and metadata events produce nothing.
#[must_use]
pub fn translate(event: &Event) -> Vec<ChangeEvent> {
    match event.kind {
        EventKind::Create(kind) => event
            .paths
            .iter()
            .map(|path| {
                let change = ChangeEvent::created(path);
                match kind {
                    CreateKind::Folder => change.directory(),
                    CreateKind::File => change,
                    _ if path.is_dir() => change.directory(),
                    _ => change,
                }
            })
            .collect(),
        EventKind::Remove(kind) => event
            .paths
            .iter()
            .map(|path| {
                let change = ChangeEvent::deleted(path);
                if kind == RemoveKind::Folder { change.directory() } else { change }
            })
            .collect(),
        EventKind::Modify(ModifyKind::Name(mode)) => rename_events(mode, &event.paths),
        _ => Vec::new(),
    }
}

fn rename_events(mode: RenameMode, paths: &[PathBuf]) -> Vec<ChangeEvent> {
    match mode {
        RenameMode::Both => {
            let to = paths.get(1);
            let change = ChangeEvent {
                kind: ChangeKind::Moved,
                paths: paths.to_vec(),
                is_directory: to.is_some_and(|path| path.is_dir()),
            };
            vec![change]
        }
        RenameMode::From => paths.iter().map(ChangeEvent::deleted).collect(),
        RenameMode::To => paths.iter().map(|path| created_at(path)).collect(),
        // Backends that cannot pair the halves report each side alone.
        RenameMode::Any | RenameMode::Other => paths
            .iter()
            .map(|path| if path.exists() { created_at(path) } else { ChangeEvent::deleted(path) })
            .collect(),
    }
}

fn created_at(path: &Path) -> ChangeEvent {
    let change = ChangeEvent::created(path);
    if path.is_dir() { change.directory() } else { change }
}
