//! On-disk snapshot of an [`Index`].
//!
//! A snapshot is a small SQLite file holding the `(path, filename)` records
//! plus a `meta` table. Suffix keys are not stored; loading replays every
//! record through [`Index::insert`], which rebuilds all three structures.

use chrono::Utc;
use rusqlite::{Connection, OpenFlags, ToSql, params};
use serde::Serialize;
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::SNAPSHOT_TMP_SUFFIX;
use crate::constants::{APPLICATION_ID_I32, EXPECTED_APPLICATION_ID, SNAPSHOT_VERSION};
use crate::error::{IndexerError, Result};
use crate::fs_utils::{
    SIDECAR_SUFFIXES, atomic_replace, remove_with_sidecars, resolve_path, with_suffix,
};
use crate::index::Index;

/// SQLite PRAGMA settings used while writing a snapshot.
#[derive(Debug, Clone)]
pub struct PragmaConfig {
    pub journal_mode: String,
    pub synchronous: String,
    pub cache_size: i64,
    pub busy_timeout_ms: i64,
}

impl Default for PragmaConfig {
    fn default() -> Self {
        Self {
            // The staged file has a single writer and is renamed when done.
            journal_mode: "DELETE".to_string(),
            synchronous: "NORMAL".to_string(),
            cache_size: -16000, // 16MB
            busy_timeout_ms: 5000,
        }
    }
}

impl PragmaConfig {
    /// `busy_timeout_ms` as a `Duration`.
    ///
    /// # Errors
    /// Returns `IndexerError::ConfigInvalid` if the timeout is negative.
    pub fn busy_timeout(&self) -> Result<Duration> {
        let millis = u64::try_from(self.busy_timeout_ms).map_err(|_| {
            IndexerError::ConfigInvalid {
                field: "busy_timeout_ms".to_string(),
                value: self.busy_timeout_ms.to_string(),
                reason: "must be >= 0".to_string(),
            }
        })?;
        Ok(Duration::from_millis(millis))
    }
}

/// Header information stored alongside the records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotMeta {
    pub version: u32,
    /// Root directory the index was built from
    pub root: String,
    /// RFC 3339 UTC timestamp
    pub saved_at: String,
    pub records: usize,
}

const SCHEMA: &str = r"
    CREATE TABLE meta (
        key TEXT PRIMARY KEY NOT NULL,
        value TEXT NOT NULL
    );
    CREATE TABLE records (
        path TEXT NOT NULL,
        filename TEXT NOT NULL,
        PRIMARY KEY (path, filename)
    ) WITHOUT ROWID;
";

/// The exact set of files one or more snapshots occupy on disk: the
/// database, its staging file, and the SQLite sidecars of both.
///
/// Paths are compared with canonical parent directories, so relative and
/// absolute spellings of the same file match. A file merely sharing a
/// snapshot's name prefix never does.
#[derive(Debug, Clone, Default)]
pub struct SnapshotFiles {
    names: HashSet<OsString>,
    paths: HashSet<PathBuf>,
}

impl SnapshotFiles {
    /// Add the files belonging to the snapshot at `snapshot`.
    #[must_use]
    pub fn with(mut self, snapshot: &Path) -> Self {
        let snapshot = resolve_path(snapshot);
        let staged = Snapshot::staging_path(&snapshot);
        let sidecars = SIDECAR_SUFFIXES
            .iter()
            .flat_map(|suffix| [with_suffix(&snapshot, suffix), with_suffix(&staged, suffix)]);

        for file in [snapshot.clone(), staged.clone()].into_iter().chain(sidecars) {
            if let Some(name) = file.file_name() {
                self.names.insert(name.to_os_string());
            }
            self.paths.insert(file);
        }
        self
    }

    /// Whether `path` is one of the tracked snapshot files.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        // Name check first; resolving touches the filesystem.
        path.file_name().is_some_and(|name| self.names.contains(name))
            && self.paths.contains(&resolve_path(path))
    }
}

fn corrupted(reason: impl Into<String>) -> IndexerError {
    IndexerError::SnapshotCorrupted { reason: reason.into() }
}

/// Save and load [`Index`] snapshots.
pub struct Snapshot;

impl Snapshot {
    /// Staging path used while `path` is being written.
    #[must_use]
    pub fn staging_path(path: &Path) -> PathBuf {
        with_suffix(path, SNAPSHOT_TMP_SUFFIX)
    }

    /// Write every record of `index` to `path`.
    ///
    /// The snapshot is written to a staging file in one transaction and
    /// renamed over `path` only once complete, so a crash mid-save leaves
    /// the previous snapshot intact.
    ///
    /// # Errors
    /// Returns `IndexerError` if:
    /// - `config.busy_timeout_ms` is negative (`ConfigInvalid`)
    /// - SQLite fails to create or write the staging file (`Database`)
    /// - fsync or rename fails (`Io`)
    pub fn save(
        index: &Index,
        path: &Path,
        root: &Path,
        config: &PragmaConfig,
    ) -> Result<SnapshotMeta> {
        let busy_timeout = config.busy_timeout()?;

        Self::refuse_foreign(path)?;

        let staged = Self::staging_path(path);
        remove_with_sidecars(&staged);

        let meta = match Self::write_staged(index, &staged, root, config, busy_timeout) {
            Ok(meta) => meta,
            Err(e) => {
                remove_with_sidecars(&staged);
                return Err(e);
            }
        };

        atomic_replace(&staged, path)?;
        remove_with_sidecars(&staged);

        tracing::info!(path = %path.display(), records = meta.records, "Saved index snapshot");
        Ok(meta)
    }

    /// Refuse to replace a SQLite file stamped by another application.
    ///
    /// Unreadable or unstamped files are fair game: they are either our own
    /// interrupted writes or not databases at all.
    fn refuse_foreign(path: &Path) -> Result<()> {
        if !path.is_file() {
            return Ok(());
        }
        let Ok(conn) = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY) else {
            return Ok(());
        };
        match conn.query_row("PRAGMA application_id", [], |row| row.get::<_, i32>(0)) {
            Ok(raw) => {
                let app_id = u32::from_ne_bytes(raw.to_ne_bytes());
                if app_id == 0 || app_id == EXPECTED_APPLICATION_ID {
                    Ok(())
                } else {
                    Err(IndexerError::ForeignDatabase { app_id })
                }
            }
            Err(_) => Ok(()),
        }
    }

    fn apply_pragma(conn: &Connection, name: &str, value: impl ToSql) -> Result<()> {
        conn.pragma_update(None, name, value).map_err(|e| IndexerError::Database { source: e })
    }

    fn write_staged(
        index: &Index,
        staged: &Path,
        root: &Path,
        config: &PragmaConfig,
        busy_timeout: Duration,
    ) -> Result<SnapshotMeta> {
        let mut conn = Connection::open(staged)?;

        Self::apply_pragma(&conn, "journal_mode", &config.journal_mode)?;
        Self::apply_pragma(&conn, "synchronous", &config.synchronous)?;
        Self::apply_pragma(&conn, "cache_size", config.cache_size)?;
        Self::apply_pragma(&conn, "trusted_schema", "OFF")?;
        Self::apply_pragma(&conn, "application_id", APPLICATION_ID_I32)?;

        conn.busy_timeout(busy_timeout)?;

        conn.execute_batch(SCHEMA)?;

        // One consistent view of the index, taken under its read lock.
        let records = index.records();
        let meta = SnapshotMeta {
            version: SNAPSHOT_VERSION,
            root: root.to_string_lossy().into_owned(),
            saved_at: Utc::now().to_rfc3339(),
            records: records.len(),
        };

        let tx = conn.transaction()?;
        {
            let mut meta_stmt = tx.prepare("INSERT INTO meta (key, value) VALUES (?1, ?2)")?;
            meta_stmt.execute(params!["version", meta.version.to_string()])?;
            meta_stmt.execute(params!["root", meta.root])?;
            meta_stmt.execute(params!["saved_at", meta.saved_at])?;
            meta_stmt.execute(params!["records", meta.records.to_string()])?;

            let mut record_stmt =
                tx.prepare("INSERT INTO records (path, filename) VALUES (?1, ?2)")?;
            for record in &records {
                record_stmt.execute(params![record.full_path, record.filename])?;
            }
        }
        tx.commit()?;

        if config.journal_mode.eq_ignore_ascii_case("wal") {
            // Leaving WAL checkpoints it, so the renamed file stands alone.
            Self::apply_pragma(&conn, "journal_mode", "DELETE")?;
        }
        conn.close().map_err(|(_, e)| IndexerError::Database { source: e })?;

        Ok(meta)
    }

    /// Load the snapshot at `path` into a fresh index.
    ///
    /// # Errors
    /// Returns `IndexerError` if:
    /// - `path` does not exist (`Io` with `NotFound`)
    /// - the file carries another application's id (`ForeignDatabase`)
    /// - the file is not a snapshot, has an unknown version, or its record
    ///   count disagrees with its header (`SnapshotCorrupted`)
    pub fn load(path: &Path) -> Result<(Index, SnapshotMeta)> {
        if !path.is_file() {
            return Err(IndexerError::Io {
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no snapshot at {}", path.display()),
                ),
            });
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| IndexerError::Database { source: e })?;

        let app_id: i32 = conn
            .query_row("PRAGMA application_id", [], |row| row.get(0))
            .map_err(|e| corrupted(format!("not a SQLite database: {e}")))?;
        let app_id = u32::from_ne_bytes(app_id.to_ne_bytes());
        if app_id == 0 {
            return Err(corrupted("missing application id"));
        }
        if app_id != EXPECTED_APPLICATION_ID {
            return Err(IndexerError::ForeignDatabase { app_id });
        }

        let meta = Self::read_meta(&conn)?;
        if meta.version != SNAPSHOT_VERSION {
            return Err(corrupted(format!("unsupported snapshot version {}", meta.version)));
        }

        let index = Index::new();
        let mut stmt = conn
            .prepare("SELECT path, filename FROM records")
            .map_err(|e| corrupted(format!("records table unreadable: {e}")))?;
        let rows =
            stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

        let mut loaded = 0usize;
        for row in rows {
            let (path, filename) = row?;
            if filename.is_empty() {
                return Err(corrupted(format!("empty filename for {path}")));
            }
            index.insert(&filename, &path);
            loaded += 1;
        }

        if loaded != meta.records {
            return Err(corrupted(format!(
                "header lists {} records, found {loaded}",
                meta.records
            )));
        }

        tracing::info!(path = %path.display(), records = loaded, "Loaded index snapshot");
        Ok((index, meta))
    }

    fn read_meta(conn: &Connection) -> Result<SnapshotMeta> {
        let get = |key: &str| -> Result<String> {
            conn.query_row("SELECT value FROM meta WHERE key = ?1", [key], |row| row.get(0))
                .map_err(|e| corrupted(format!("meta '{key}' unreadable: {e}")))
        };

        let parse = |key: &str, value: String| -> Result<usize> {
            value.parse().map_err(|_| corrupted(format!("meta '{key}' is not a number: {value}")))
        };

        let version = parse("version", get("version")?)?;
        Ok(SnapshotMeta {
            version: u32::try_from(version)
                .map_err(|_| corrupted(format!("unsupported snapshot version {version}")))?,
            root: get("root")?,
            saved_at: get("saved_at")?,
            records: parse("records", get("records")?)?,
        })
    }
}
