//! ffind-indexer - Live filename substring search
//!
//! Builds an in-memory suffix index over every file name under a root,
//! answers case-insensitive multi-term substring queries against it, and
//! keeps it current from filesystem change events.
//!
//! # Example
//!
//! ```rust
//! use ffind_indexer::{BuildConfig, IndexBuilder, SearchConfig, Searcher};
//! use std::time::{SystemTime, UNIX_EPOCH};
//!
//! let unique = SystemTime::now().duration_since(UNIX_EPOCH)?.as_nanos();
//! let root = std::env::temp_dir().join(format!("ffind-doctest-{unique}"));
//! std::fs::create_dir_all(root.join("docs"))?;
//! std::fs::write(root.join("docs/Quarterly_Report.pdf"), "")?;
//! std::fs::write(root.join("notes.md"), "")?;
//!
//! let (index, _stats) = IndexBuilder::new(&root, BuildConfig::default()).build()?;
//! let hits = Searcher::new(&index, SearchConfig::default()).search("report PDF");
//! assert_eq!(hits.len(), 1);
//! assert_eq!(hits[0].filename, "Quarterly_Report.pdf");
//!
//! let _ = std::fs::remove_dir_all(&root);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Default snapshot filename, created inside the indexed root.
pub const SNAPSHOT_NAME: &str = ".ffind-index.db";

/// Suffix of the staging file written before a snapshot is renamed into place.
pub const SNAPSHOT_TMP_SUFFIX: &str = ".tmp";

pub mod builder;
pub mod cancel;
pub mod cli;
pub mod constants;
pub mod error;
mod fs_utils;
pub mod index;
pub mod search;
pub mod snapshot;
pub mod suffix;
pub mod updater;
pub mod watch;

pub use builder::{BuildConfig, BuildStats, IndexBuilder, validate_root};
pub use cancel::CancellationToken;
pub use cli::OutputFormat;
pub use error::{ExitCode, IndexerError, Result};
pub use index::{Index, IndexRecord, IndexStats};
pub use search::{DEFAULT_LIMIT, SearchConfig, Searcher};
pub use snapshot::{PragmaConfig, Snapshot, SnapshotFiles, SnapshotMeta};
pub use updater::{
    ChangeEvent, ChangeKind, EventOutcome, IndexUpdater, UpdaterHandle, UpdaterStats,
};
