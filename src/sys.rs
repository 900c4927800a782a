//! OS-level file operations: atomic replacement and ownership preservation.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// Prefix for temporary files created next to the file being replaced.
const TEMP_PREFIX: &str = ".stickyconf-";

/// Returns true when the process runs with an effective UID of 0.
#[cfg(unix)]
pub fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}

#[cfg(not(unix))]
pub fn is_root() -> bool {
    false
}

/// Give `path` the owner and group recorded in `meta`.
///
/// Only root can hand files to other users, so this is a no-op for
/// unprivileged processes.
#[cfg(unix)]
pub fn copy_ownership(meta: &fs::Metadata, path: &Path) -> io::Result<()> {
    use nix::unistd::{Gid, Uid, chown};
    use std::os::unix::fs::MetadataExt;

    if !is_root() {
        return Ok(());
    }

    chown(
        path,
        Some(Uid::from_raw(meta.uid())),
        Some(Gid::from_raw(meta.gid())),
    )
    .map_err(io::Error::from)
}

#[cfg(not(unix))]
pub fn copy_ownership(_meta: &fs::Metadata, _path: &Path) -> io::Result<()> {
    Ok(())
}

/// Replace `path` with `contents` via a temporary file in the same directory
/// and a rename, so readers see either the old or the new file, never a
/// partial one.
///
/// If `path` already exists its permissions (and, as root, its owner) are
/// carried over to the replacement.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .tempfile_in(dir)?;
    tmp.write_all(contents)?;

    match fs::metadata(path) {
        Ok(meta) => {
            fs::set_permissions(tmp.path(), meta.permissions())?;
            copy_ownership(&meta, tmp.path())?;
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    Ok(())
}
