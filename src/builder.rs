use ignore::{DirEntry, WalkBuilder, WalkState};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::SNAPSHOT_NAME;
use crate::cancel::CancellationToken;
use crate::error::{IndexerError, Result};
use crate::index::Index;
use crate::snapshot::SnapshotFiles;

/// Configuration for a bulk build.
#[derive(Debug, Clone, Default)]
pub struct BuildConfig {
    /// Walker threads (0 = pick from available parallelism)
    pub threads: usize,
    /// Follow symlinks (disabled by default)
    pub follow_symlinks: bool,
    /// Honour .gitignore, .ignore and hidden-file rules (disabled by default,
    /// so every file under the root is indexed)
    pub standard_filters: bool,
}

/// Statistics from a bulk build.
#[derive(Debug, Default, Clone)]
pub struct BuildStats {
    pub files_indexed: u64,
    /// Entries that disappeared between discovery and insertion
    pub files_vanished: u64,
    /// Unreadable directories and failed metadata lookups
    pub walk_errors: u64,
    pub duration: Duration,
    /// True if the build stopped early; the index holds a valid subset
    pub cancelled: bool,
}

#[derive(Default)]
struct WalkCounters {
    files_indexed: AtomicU64,
    files_vanished: AtomicU64,
    walk_errors: AtomicU64,
}

/// Concurrent directory walker that populates an [`Index`].
///
/// Uses the `ignore` crate's parallel walker; each walker thread inserts
/// straight into the shared index, which serializes the mutations.
pub struct IndexBuilder {
    root: PathBuf,
    config: BuildConfig,
    cancel: CancellationToken,
    /// Snapshot files never indexed; the default snapshot is always here.
    snapshot_files: SnapshotFiles,
}

impl IndexBuilder {
    /// Create a builder for the tree rooted at `root`.
    pub fn new(root: &Path, config: BuildConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            config,
            cancel: CancellationToken::new(),
            snapshot_files: SnapshotFiles::default().with(&root.join(SNAPSHOT_NAME)),
        }
    }

    /// Abandon the walk when `token` is cancelled.
    #[must_use]
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Never index the snapshot at `path`, its staging file, or their
    /// SQLite sidecars. Other files sharing its name prefix are indexed.
    ///
    /// Used to keep a custom snapshot stored inside the root out of the
    /// results.
    #[must_use]
    pub fn exclude(mut self, path: &Path) -> Self {
        self.snapshot_files = self.snapshot_files.with(path);
        self
    }

    /// Build a fresh index.
    ///
    /// # Errors
    /// Returns `IndexerError::InvalidRoot` if the root does not exist or is
    /// not a directory. Per-entry failures are counted, not returned.
    pub fn build(&self) -> Result<(Index, BuildStats)> {
        let index = Index::new();
        let stats = self.build_into(&index)?;
        Ok((index, stats))
    }

    /// Walk the tree and insert every non-directory entry into `index`.
    ///
    /// Returns once the walk has finished and every insertion has been
    /// applied, or once the walk noticed cancellation.
    ///
    /// # Errors
    /// Returns `IndexerError::InvalidRoot` before touching `index` if the
    /// root is unusable.
    pub fn build_into(&self, index: &Index) -> Result<BuildStats> {
        validate_root(&self.root)?;

        let start = Instant::now();
        let counters = WalkCounters::default();

        let walker = WalkBuilder::new(&self.root)
            .standard_filters(self.config.standard_filters)
            .follow_links(self.config.follow_symlinks)
            .threads(self.config.threads)
            .build_parallel();

        walker.run(|| {
            let counters = &counters;
            Box::new(move |result| {
                if self.cancel.is_cancelled() {
                    return WalkState::Quit;
                }
                match result {
                    Ok(entry) => self.visit(&entry, index, counters),
                    Err(e) => {
                        tracing::warn!(error = %e, "Directory walk error");
                        counters.walk_errors.fetch_add(1, Ordering::Relaxed);
                    }
                }
                WalkState::Continue
            })
        });

        let stats = BuildStats {
            files_indexed: counters.files_indexed.into_inner(),
            files_vanished: counters.files_vanished.into_inner(),
            walk_errors: counters.walk_errors.into_inner(),
            duration: start.elapsed(),
            cancelled: self.cancel.is_cancelled(),
        };

        if stats.cancelled {
            tracing::info!(files = stats.files_indexed, "Build cancelled");
        }

        Ok(stats)
    }

    /// Process a single walk entry.
    fn visit(&self, entry: &DirEntry, index: &Index, counters: &WalkCounters) {
        // Directories are traversed, never indexed.
        if entry.file_type().is_some_and(|ft| ft.is_dir()) {
            return;
        }

        let path = entry.path();
        // An unfollowed symlink to a directory is still a directory.
        if entry.path_is_symlink() && path.is_dir() {
            return;
        }
        if self.snapshot_files.contains(path) {
            return;
        }

        // Confirm the entry still exists; a live tree can change under us.
        if let Err(e) = entry.metadata() {
            if e.io_error().is_some_and(|io| io.kind() == ErrorKind::NotFound) {
                tracing::debug!(path = %path.display(), "Entry vanished before indexing");
                counters.files_vanished.fetch_add(1, Ordering::Relaxed);
            } else {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read metadata");
                counters.walk_errors.fetch_add(1, Ordering::Relaxed);
            }
            return;
        }

        let Some(filename) = path.file_name() else {
            return;
        };

        index.insert(&filename.to_string_lossy(), &path.to_string_lossy());
        counters.files_indexed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the build root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the configuration.
    pub const fn config(&self) -> &BuildConfig {
        &self.config
    }
}

/// Ensure `root` exists and is a directory.
///
/// # Errors
/// Returns `IndexerError::InvalidRoot` describing what is wrong.
pub fn validate_root(root: &Path) -> Result<()> {
    let invalid = |reason: String| IndexerError::InvalidRoot {
        path: root.to_string_lossy().to_string(),
        reason,
    };

    match fs::metadata(root) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(invalid("not a directory".to_string())),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(invalid("does not exist".to_string())),
        Err(e) => Err(invalid(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn paths(index: &Index) -> Vec<String> {
        index.records().into_iter().map(|r| r.full_path).collect()
    }

    #[test]
    fn test_build_empty_dir() {
        let dir = tempdir().unwrap();
        let (index, stats) = IndexBuilder::new(dir.path(), BuildConfig::default()).build().unwrap();
        assert_eq!(stats.files_indexed, 0);
        assert!(index.is_empty());
        assert!(!stats.cancelled);
    }

    #[test]
    fn test_build_nested_dirs_skips_directories() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/lib")).unwrap();
        fs::write(dir.path().join("src/lib/utils.rs"), "").unwrap();
        fs::write(dir.path().join("main.rs"), "").unwrap();

        let (index, stats) = IndexBuilder::new(dir.path(), BuildConfig::default()).build().unwrap();
        assert_eq!(stats.files_indexed, 2);
        assert_eq!(index.len(), 2);
        assert!(index.paths_for_name("lib").is_empty());
        assert!(index.paths_for_name("src").is_empty());

        let utils = dir.path().join("src/lib/utils.rs");
        assert_eq!(index.paths_for_name("utils.rs"), vec![utils.to_string_lossy().to_string()]);
    }

    #[test]
    fn test_build_indexes_hidden_files_by_default() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(".env"), "").unwrap();
        fs::write(dir.path().join(".gitignore"), "ignored.txt\n").unwrap();
        fs::write(dir.path().join("ignored.txt"), "").unwrap();

        let (index, _) = IndexBuilder::new(dir.path(), BuildConfig::default()).build().unwrap();
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_build_standard_filters_respects_ignore_rules() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(".ignore"), "ignored.txt\n").unwrap();
        fs::write(dir.path().join("ignored.txt"), "").unwrap();
        fs::write(dir.path().join("kept.txt"), "").unwrap();

        let config = BuildConfig { standard_filters: true, ..Default::default() };
        let (index, _) = IndexBuilder::new(dir.path(), config).build().unwrap();
        assert_eq!(index.paths_for_name("kept.txt").len(), 1);
        assert!(index.paths_for_name("ignored.txt").is_empty());
    }

    #[test]
    fn test_build_skips_snapshot_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(SNAPSHOT_NAME), "").unwrap();
        fs::write(dir.path().join(format!("{SNAPSHOT_NAME}.tmp")), "").unwrap();
        fs::write(dir.path().join("custom.db"), "").unwrap();
        fs::write(dir.path().join("custom.db-journal"), "").unwrap();
        fs::write(dir.path().join("real.txt"), "").unwrap();

        let (index, _) = IndexBuilder::new(dir.path(), BuildConfig::default())
            .exclude(&dir.path().join("custom.db"))
            .build()
            .unwrap();
        assert_eq!(paths(&index), vec![dir.path().join("real.txt").to_string_lossy().to_string()]);
    }

    #[test]
    fn test_build_indexes_files_sharing_snapshot_prefix() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        for name in ["notes", "notes.txt", "notes_2024.md", "notes-wal"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        fs::write(dir.path().join(format!("{SNAPSHOT_NAME}.bak")), "").unwrap();
        fs::write(dir.path().join("sub").join(SNAPSHOT_NAME), "").unwrap();

        let (index, _) = IndexBuilder::new(dir.path(), BuildConfig::default())
            .exclude(&dir.path().join("notes"))
            .build()
            .unwrap();

        let mut names: Vec<String> = index.records().into_iter().map(|r| r.filename).collect();
        names.sort();
        // Only the root's own snapshot is skipped, never a nested one.
        let expected = vec![
            SNAPSHOT_NAME.to_string(),
            format!("{SNAPSHOT_NAME}.bak"),
            "notes.txt".to_string(),
            "notes_2024.md".to_string(),
        ];
        assert_eq!(names, expected);
    }

    #[test]
    fn test_build_excludes_snapshot_spelled_through_parent_dir() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("custom.db"), "").unwrap();
        fs::write(dir.path().join("kept.txt"), "").unwrap();

        // `..` segments resolve to the same file as the walked path.
        let roundabout = dir.path().join("..").join(dir.path().file_name().unwrap());
        let (index, _) = IndexBuilder::new(dir.path(), BuildConfig::default())
            .exclude(&roundabout.join("custom.db"))
            .build()
            .unwrap();
        assert_eq!(paths(&index), vec![dir.path().join("kept.txt").to_string_lossy().to_string()]);
    }

    #[test]
    fn test_build_missing_root_is_invalid() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing");
        let err = IndexBuilder::new(&missing, BuildConfig::default()).build().unwrap_err();
        assert!(matches!(err, IndexerError::InvalidRoot { .. }));
    }

    #[test]
    fn test_build_file_root_is_invalid_and_leaves_index_untouched() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("file.txt");
        fs::write(&file, "").unwrap();

        let index = Index::new();
        index.insert("keep.txt", "/keep.txt");
        let err = IndexBuilder::new(&file, BuildConfig::default()).build_into(&index).unwrap_err();
        assert!(matches!(err, IndexerError::InvalidRoot { .. }));
        assert_eq!(paths(&index), vec!["/keep.txt"]);
    }

    #[test]
    fn test_build_cancelled_before_start_indexes_nothing() {
        let dir = tempdir().unwrap();
        for i in 0..10 {
            fs::write(dir.path().join(format!("f{i}.txt")), "").unwrap();
        }

        let token = CancellationToken::new();
        token.cancel();
        let (index, stats) = IndexBuilder::new(dir.path(), BuildConfig::default())
            .with_cancel(token)
            .build()
            .unwrap();
        assert!(stats.cancelled);
        assert!(index.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_build_does_not_follow_symlinks_by_default() {
        use std::os::unix::fs::symlink;

        let dir = tempdir().unwrap();
        let real_dir = dir.path().join("real");
        fs::create_dir_all(&real_dir).unwrap();
        fs::write(real_dir.join("inner.rs"), "").unwrap();
        symlink(&real_dir, dir.path().join("linkdir")).unwrap();

        let (index, _) = IndexBuilder::new(dir.path(), BuildConfig::default()).build().unwrap();
        assert_eq!(index.paths_for_name("inner.rs").len(), 1);

        let config = BuildConfig { follow_symlinks: true, ..Default::default() };
        let (index, _) = IndexBuilder::new(dir.path(), config).build().unwrap();
        assert_eq!(index.paths_for_name("inner.rs").len(), 2);
    }
}
