use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub(crate) fn sync_file(path: &Path) -> io::Result<()> {
    let file = fs::File::open(path)?;
    file.sync_all()
}

/// Flush the directory entry for `path` so a preceding rename survives a
/// crash. A no-op where directories cannot be opened for syncing.
pub(crate) fn sync_parent_dir(path: &Path) -> io::Result<()> {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };

    #[cfg(unix)]
    {
        fs::File::open(parent)?.sync_all()
    }

    #[cfg(not(unix))]
    {
        if parent.is_dir() {
            Ok(())
        } else {
            Err(io::Error::new(io::ErrorKind::NotFound, "parent directory missing"))
        }
    }
}

/// Replace `target` with the fully written file at `staged`.
///
/// `staged` is fsynced before the rename and the parent directory after it.
/// On failure `staged` is removed and `target` is left as it was.
pub(crate) fn atomic_replace(staged: &Path, target: &Path) -> io::Result<()> {
    let result = sync_file(staged).and_then(|()| fs::rename(staged, target));
    if let Err(e) = result {
        let _ = fs::remove_file(staged);
        return Err(e);
    }
    sync_parent_dir(target)
}

/// Suffixes SQLite appends to a database path for its side files.
pub(crate) const SIDECAR_SUFFIXES: [&str; 3] = ["-journal", "-wal", "-shm"];

/// `path` with `suffix` appended to its final component.
pub(crate) fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut joined = path.as_os_str().to_owned();
    joined.push(suffix);
    PathBuf::from(joined)
}

/// Absolute form of `path` with its parent directory canonicalized.
///
/// The file itself need not exist. Falls back to the plain absolute path
/// when the parent cannot be resolved.
pub(crate) fn resolve_path(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => {
            parent.canonicalize().map_or_else(|_| absolute.clone(), |dir| dir.join(name))
        }
        _ => absolute,
    }
}

/// Remove `path` and the SQLite sidecar files that may accompany it.
pub(crate) fn remove_with_sidecars(path: &Path) {
    let _ = fs::remove_file(path);
    for suffix in SIDECAR_SUFFIXES {
        let _ = fs::remove_file(with_suffix(path, suffix));
    }
}
