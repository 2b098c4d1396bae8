use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use crate::{
    SNAPSHOT_NAME,
    builder::BuildConfig,
    error::{IndexerError, Result},
    search::DEFAULT_LIMIT,
    snapshot::PragmaConfig,
};

/// Output format for search results and stats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Plain,
    Json,
}

/// CLI arguments for the filename indexer.
#[derive(Parser, Debug)]
#[command(
    name = "ffind",
    version = env!("CARGO_PKG_VERSION"),
    about = "Instant substring search over file names",
    long_about = concat!("Instant substring search over file names

Walks a directory tree once, keeps every file name in an in-memory suffix
index and answers case-insensitive substring queries against it. Multiple
terms are ANDed. The index is saved as a snapshot next to the tree and can
be kept current with `watch`.

Version: ", env!("CARGO_PKG_VERSION"), "

SUBCOMMANDS:
  search     Search file names (default when a query is provided)
  index      Walk the root and write a fresh snapshot
  watch      Interactive search with live filesystem updates
  stats      Print index statistics

EXIT CODES:
  0   Success
  1   Internal error
  2   Snapshot unusable
  3   I/O error
  4   Invalid root or option
  5   Permission denied")
)]
pub struct Cli {
    /// Search query (triggers search mode if provided)
    #[arg(index = 1)]
    pub query: Vec<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Suppress status messages (for CI/scripting)
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Directory to index (defaults to current directory)
    #[arg(long, env = "FFIND_ROOT", global = true)]
    pub root: Option<PathBuf>,

    /// Snapshot file (defaults to `<root>/.ffind-index.db`)
    #[arg(long, global = true)]
    pub snapshot: Option<PathBuf>,

    /// Walker threads (0 = one per CPU)
    #[arg(long, default_value = "0", global = true)]
    pub threads: usize,

    /// Follow symlinks while indexing (disabled by default for safety)
    #[arg(long, global = true)]
    pub follow_symlinks: bool,

    /// Skip hidden files and honour .gitignore/.ignore while indexing
    #[arg(long, global = true)]
    pub standard_filters: bool,

    /// Busy timeout in milliseconds when writing the snapshot
    #[arg(long, default_value = "5000", value_parser = validate_busy_timeout, global = true)]
    pub pragma_busy_timeout: i64,

    /// `SQLite` synchronous mode (`OFF`, `NORMAL`, `FULL`, `EXTRA`)
    #[arg(long, default_value = "NORMAL", value_parser = validate_synchronous, global = true)]
    pub pragma_synchronous: String,
}

/// Subcommands for ffind.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Walk the root and write a fresh snapshot.
    Index {
        /// Build in memory only
        #[arg(long)]
        no_save: bool,
    },
    /// Search file names (this is the default when a query is provided).
    Search {
        /// Search terms; every term must appear in the file name
        #[arg(index = 1, required = true)]
        query: Vec<String>,
        /// Maximum number of results
        #[arg(long, short = 'n', default_value_t = DEFAULT_LIMIT, value_parser = validate_limit)]
        limit: usize,
        /// Output format
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
        /// Ignore any snapshot and walk the root again
        #[arg(long)]
        rebuild: bool,
    },
    /// Read queries from stdin while applying filesystem changes live.
    Watch {
        /// Maximum number of results per query
        #[arg(long, short = 'n', default_value_t = DEFAULT_LIMIT, value_parser = validate_limit)]
        limit: usize,
    },
    /// Print index statistics.
    Stats {
        /// Output format
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },
}

/// Validates `limit`: must be a positive integer.
fn validate_limit(s: &str) -> std::result::Result<usize, String> {
    let val: usize = s.parse().map_err(|_| "invalid integer".to_string())?;

    if val == 0 {
        return Err("must be >= 1".to_string());
    }

    Ok(val)
}

/// Validates `busy_timeout`: must be non-negative.
fn validate_busy_timeout(s: &str) -> std::result::Result<i64, String> {
    let val: i64 = s.parse().map_err(|_| "invalid integer".to_string())?;

    if val < 0 {
        return Err("must be >= 0".to_string());
    }

    Ok(val)
}

/// Validates synchronous mode: must be OFF, NORMAL, FULL, or EXTRA.
fn validate_synchronous(s: &str) -> std::result::Result<String, String> {
    match s.to_uppercase().as_str() {
        "OFF" | "NORMAL" | "FULL" | "EXTRA" => Ok(s.to_uppercase()),
        _ => Err("must be OFF, NORMAL, FULL, or EXTRA".to_string()),
    }
}

impl Cli {
    /// Get the root directory to index.
    ///
    /// Falls back to the current directory when `--root` and `FFIND_ROOT`
    /// are both absent.
    ///
    /// # Errors
    /// Returns `IndexerError::ConfigInvalid` if:
    /// - The `~` home directory expansion fails (home directory cannot be determined)
    /// - The current directory cannot be accessed when no explicit path is provided
    pub fn root(&self) -> Result<PathBuf> {
        match &self.root {
            Some(path) => expand_tilde("root", path),
            None => std::env::current_dir().map_err(|e| IndexerError::ConfigInvalid {
                field: "root".to_string(),
                value: "current_dir".to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Get the snapshot path for `root`.
    ///
    /// # Errors
    /// Returns `IndexerError::ConfigInvalid` if `~` expansion fails.
    pub fn snapshot_path(&self, root: &Path) -> Result<PathBuf> {
        match &self.snapshot {
            Some(path) => expand_tilde("snapshot", path),
            None => Ok(root.join(SNAPSHOT_NAME)),
        }
    }

    #[must_use]
    pub const fn build_config(&self) -> BuildConfig {
        BuildConfig {
            threads: self.threads,
            follow_symlinks: self.follow_symlinks,
            standard_filters: self.standard_filters,
        }
    }

    #[must_use]
    pub fn pragma_config(&self) -> PragmaConfig {
        PragmaConfig {
            synchronous: self.pragma_synchronous.clone(),
            busy_timeout_ms: self.pragma_busy_timeout,
            ..PragmaConfig::default()
        }
    }

    /// Get the search query as a single string.
    #[must_use]
    pub fn query_string(&self) -> Option<String> {
        if self.query.is_empty() { None } else { Some(self.query.join(" ")) }
    }
}

/// Expand tilde (`~`) to home directory in path.
fn expand_tilde(field: &str, path: &Path) -> Result<PathBuf> {
    if let Some(stripped) = path.to_str().and_then(|s| s.strip_prefix('~')) {
        let home = dirs::home_dir().ok_or_else(|| IndexerError::ConfigInvalid {
            field: field.to_string(),
            value: path.to_string_lossy().to_string(),
            reason: "Could not determine home directory".to_string(),
        })?;
        if stripped.is_empty() {
            return Ok(home);
        }
        if let Some(rest) = stripped.strip_prefix(['/', '\\']) {
            return Ok(home.join(rest));
        }
    }
    Ok(path.to_path_buf())
}
