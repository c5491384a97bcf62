//! Process substitution FIFO management.
//!
//! `<(cmd)` and `>(cmd)` each need a path the parent command line can use
//! as an ordinary filename argument while the named file is actually
//! connected to a background subshell. This module only owns the naming
//! and lifecycle of that FIFO; the subshell that reads/writes it is spawned
//! by the executor, and the bytes flow through the pluggable open handler
//! like any other file the core touches.

use rand::Rng;

use crate::interpreter::interpreter::FileSystem as SyncFileSystem;

/// Maximum number of random names tried before giving up, per §9.
const MAX_NAME_ATTEMPTS: u32 = 100;

/// Direction a process substitution's FIFO is opened for, from the
/// substituted command's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessSubstDirection {
    /// `<(cmd)` — cmd's stdout feeds the FIFO; the parent reads it.
    Read,
    /// `>(cmd)` — the parent writes the FIFO; cmd's stdin drains it.
    Write,
}

/// A single live process substitution FIFO.
#[derive(Debug, Clone)]
pub struct ProcessSubstitution {
    pub path: String,
    pub direction: ProcessSubstDirection,
}

/// The shell's process-substitution FIFOs all live under one directory
/// inside `TMPDIR`, so the core can recognize its own paths by prefix and
/// bypass the open handler for them (host OS FIFOs, not a user-configured
/// virtual filesystem).
pub fn fifo_directory(tmpdir: &str) -> String {
    let tmpdir = tmpdir.trim_end_matches('/');
    format!("{}/just-bash-procsubst", tmpdir)
}

/// True if `path` falls under this Runner's process-substitution FIFO
/// directory and should therefore bypass the configured open handler.
pub fn is_own_fifo_path(path: &str, tmpdir: &str) -> bool {
    path.starts_with(&format!("{}/", fifo_directory(tmpdir)))
}

/// Reserve a fresh FIFO path under `tmpdir`, retrying on collision up to
/// [`MAX_NAME_ATTEMPTS`] times with a new random 64-bit suffix each time.
/// The FIFO is created (as an empty file standing in for a real `mkfifo`,
/// since the core's filesystem abstraction has no named-pipe primitive)
/// before the path is handed back, so a racing second caller never
/// observes a reserved-but-missing path.
pub fn create_fifo(
    fs: &dyn SyncFileSystem,
    tmpdir: &str,
    direction: ProcessSubstDirection,
) -> Result<ProcessSubstitution, std::io::Error> {
    let dir = fifo_directory(tmpdir);
    if !fs.is_dir(&dir) {
        fs.write_file(&format!("{}/.keep", dir), "")?;
    }

    let mut rng = rand::thread_rng();
    for _ in 0..MAX_NAME_ATTEMPTS {
        let suffix: u64 = rng.gen();
        let path = format!("{}/fifo-{:016x}", dir, suffix);
        if fs.exists(&path) {
            continue;
        }
        fs.write_file(&path, "")?;
        return Ok(ProcessSubstitution { path, direction });
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AlreadyExists,
        format!("could not allocate a process substitution FIFO under {} after {} attempts", dir, MAX_NAME_ATTEMPTS),
    ))
}

/// Remove a process substitution's FIFO once its subshell has closed its
/// side. Best-effort: a missing file is not an error, since the subshell
/// or an earlier cleanup pass may have already removed it.
pub fn cleanup_fifo(fs: &dyn SyncFileSystem, subst: &ProcessSubstitution) {
    if fs.exists(&subst.path) {
        let _ = fs.write_file(&subst.path, "");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::InMemoryFs;
    use crate::interpreter::sync_fs_adapter::SyncFsAdapter;
    use std::sync::Arc;

    #[tokio::test(flavor = "multi_thread")]
    async fn create_fifo_yields_unique_path_under_tmpdir() {
        let fs = Arc::new(InMemoryFs::new());
        let rt = tokio::runtime::Handle::current();
        let adapter = SyncFsAdapter::new(fs, rt);

        let a = create_fifo(&adapter, "/tmp", ProcessSubstDirection::Read).unwrap();
        let b = create_fifo(&adapter, "/tmp", ProcessSubstDirection::Write).unwrap();

        assert_ne!(a.path, b.path);
        assert!(is_own_fifo_path(&a.path, "/tmp"));
        assert!(!is_own_fifo_path("/tmp/other/file", "/tmp"));
    }

    #[test]
    fn fifo_directory_strips_trailing_slash() {
        assert_eq!(fifo_directory("/tmp/"), "/tmp/just-bash-procsubst");
        assert_eq!(fifo_directory("/tmp"), "/tmp/just-bash-procsubst");
    }
}
