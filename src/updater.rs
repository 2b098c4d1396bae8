//! Incremental index maintenance from filesystem change events.
//!
//! Producers (the notify bridge in [`crate::watch`], tests, embedders) send
//! [`ChangeEvent`]s into a channel. A single consumer thread owns the
//! receiving end and applies each event through the index's atomic
//! operations. Nothing else touches the index on the update path.

use crossbeam_channel::{Receiver, Sender};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use crate::error::{IndexerError, Result};
use crate::index::Index;

/// What happened to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// `paths[0]` appeared
    Created,
    /// `paths[0]` disappeared
    Deleted,
    /// `paths[0]` was renamed to `paths[1]`
    Moved,
}

/// A filesystem change reported by an event source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub paths: Vec<PathBuf>,
    pub is_directory: bool,
}

impl ChangeEvent {
    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self { kind: ChangeKind::Created, paths: vec![path.into()], is_directory: false }
    }

    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self { kind: ChangeKind::Deleted, paths: vec![path.into()], is_directory: false }
    }

    pub fn moved(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self {
            kind: ChangeKind::Moved,
            paths: vec![from.into(), to.into()],
            is_directory: false,
        }
    }

    /// Mark the event as concerning a directory.
    #[must_use]
    pub const fn directory(mut self) -> Self {
        self.is_directory = true;
        self
    }
}

/// Result of applying one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Applied,
    IgnoredDirectory,
    Malformed,
}

/// Counters reported when the updater stops.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UpdaterStats {
    pub applied: u64,
    pub ignored: u64,
    pub malformed: u64,
}

impl UpdaterStats {
    fn record(&mut self, outcome: EventOutcome) {
        match outcome {
            EventOutcome::Applied => self.applied += 1,
            EventOutcome::IgnoredDirectory => self.ignored += 1,
            EventOutcome::Malformed => self.malformed += 1,
        }
    }
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn record_parts(path: &Path) -> Option<(String, String)> {
    let filename = path.file_name()?;
    Some((filename.to_string_lossy().into_owned(), path_key(path)))
}

fn malformed(event: &ChangeEvent, reason: &'static str) -> EventOutcome {
    tracing::warn!(
        kind = ?event.kind,
        paths = ?event.paths,
        reason,
        "Dropping malformed change event"
    );
    EventOutcome::Malformed
}

/// Apply one event to `index`.
///
/// Directory events are ignored. Deleting or moving an unindexed path is
/// not an error. Malformed events are logged and dropped.
pub fn apply(index: &Index, event: &ChangeEvent) -> EventOutcome {
    if event.is_directory {
        return EventOutcome::IgnoredDirectory;
    }

    match (event.kind, event.paths.as_slice()) {
        (ChangeKind::Created, [path, ..]) => {
            let Some((filename, full_path)) = record_parts(path) else {
                return malformed(event, "path has no file name");
            };
            index.insert(&filename, &full_path);
        }
        (ChangeKind::Deleted, [path, ..]) => {
            index.remove(&path_key(path));
        }
        (ChangeKind::Moved, [from, to, ..]) => {
            let Some((filename, full_path)) = record_parts(to) else {
                return malformed(event, "destination has no file name");
            };
            index.rename(&path_key(from), &filename, &full_path);
        }
        (ChangeKind::Moved, _) => return malformed(event, "move needs source and destination"),
        (_, []) => return malformed(event, "missing path"),
    }

    tracing::debug!(kind = ?event.kind, paths = ?event.paths, "Applied change event");
    EventOutcome::Applied
}

/// Spawns the consumer thread that keeps an index in sync.
pub struct IndexUpdater;

impl IndexUpdater {
    /// Start consuming events for `index`.
    ///
    /// # Errors
    /// Returns `IndexerError::Io` if the thread cannot be spawned.
    pub fn spawn(index: Arc<Index>) -> Result<UpdaterHandle> {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
        let stopping = Arc::new(AtomicBool::new(false));

        let worker_stopping = Arc::clone(&stopping);
        let worker = std::thread::Builder::new()
            .name("ffind-updater".to_string())
            .spawn(move || run(&index, &events_rx, &shutdown_rx, &worker_stopping))
            .map_err(|e| IndexerError::Io { source: e })?;

        tracing::info!("Index updater started");
        Ok(UpdaterHandle {
            events: events_tx,
            shutdown: shutdown_tx,
            stopping,
            worker: Some(worker),
        })
    }
}

fn run(
    index: &Index,
    events: &Receiver<ChangeEvent>,
    shutdown: &Receiver<()>,
    stopping: &AtomicBool,
) -> UpdaterStats {
    let mut stats = UpdaterStats::default();

    loop {
        crossbeam_channel::select! {
            recv(shutdown) -> _ => break,
            recv(events) -> message => {
                // select! picks fairly among ready channels; honour a stop
                // request even when events are still queued.
                if stopping.load(Ordering::Acquire) {
                    break;
                }
                match message {
                    Ok(event) => stats.record(apply(index, &event)),
                    // Every sender is gone.
                    Err(_) => break,
                }
            }
        }
    }

    stats
}

/// Owner of a running updater thread.
///
/// Dropping the handle stops the thread like [`stop`](Self::stop).
pub struct UpdaterHandle {
    events: Sender<ChangeEvent>,
    shutdown: Sender<()>,
    stopping: Arc<AtomicBool>,
    worker: Option<JoinHandle<UpdaterStats>>,
}

impl UpdaterHandle {
    /// A sender for event producers. Clone freely.
    #[must_use]
    pub fn sender(&self) -> Sender<ChangeEvent> {
        self.events.clone()
    }

    /// Queue one event.
    ///
    /// # Errors
    /// Returns `IndexerError::Io` if the updater thread has exited.
    pub fn send(&self, event: ChangeEvent) -> Result<()> {
        self.events.send(event).map_err(|_| IndexerError::Io {
            source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "index updater stopped"),
        })
    }

    /// Stop now. The event being applied finishes; queued events are
    /// discarded.
    pub fn stop(mut self) -> UpdaterStats {
        self.shutdown_now()
    }

    /// Apply everything already queued, then stop.
    ///
    /// Waits until every sender obtained from [`sender`](Self::sender) has
    /// been dropped, because until then more events may still arrive.
    pub fn finish(mut self) -> UpdaterStats {
        // Swap in a sender for a channel nobody reads so ours disconnects.
        let (detached, _) = crossbeam_channel::bounded(0);
        drop(std::mem::replace(&mut self.events, detached));
        self.join()
    }

    fn shutdown_now(&mut self) -> UpdaterStats {
        self.stopping.store(true, Ordering::Release);
        // Full or disconnected both mean the worker already knows.
        let _ = self.shutdown.try_send(());
        self.join()
    }

    fn join(&mut self) -> UpdaterStats {
        let Some(worker) = self.worker.take() else {
            return UpdaterStats::default();
        };

        match worker.join() {
            Ok(stats) => {
                tracing::info!(
                    applied = stats.applied,
                    ignored = stats.ignored,
                    malformed = stats.malformed,
                    "Index updater stopped"
                );
                stats
            }
            Err(_) => {
                tracing::error!("Index updater thread panicked");
                UpdaterStats::default()
            }
        }
    }
}

impl Drop for UpdaterHandle {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.shutdown_now();
        }
    }
}
