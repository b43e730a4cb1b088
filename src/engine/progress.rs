//! Replication progress persistence.
//!
//! [`ProgressStore`] snapshots the replicated offset with the
//! write-tmp/fdatasync/rename protocol; the rename is the commit point, so a
//! crash leaves either the old snapshot or the new one, never a torn file.
//! [`SyncProgress`] is the in-memory mirror the persister reads without
//! taking the coordinator mutex.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

/// Size of the progress file: one little-endian u64 offset.
pub const PROGRESS_SIZE: usize = 8;

/// Crash-safe persistence of the replicated offset.
pub struct ProgressStore {
    path: PathBuf,
    tmp_path: PathBuf,
}

impl ProgressStore {
    pub fn new(path: PathBuf, tmp_path: PathBuf) -> Self {
        ProgressStore { path, tmp_path }
    }

    /// Load the last snapshotted offset.
    ///
    /// An absent or short file loads as 0; only a complete snapshot is
    /// trusted. Any other IO error propagates.
    pub fn load(&self) -> io::Result<u64> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut buf = [0u8; PROGRESS_SIZE];
        let mut filled = 0;
        while filled < buf.len() {
            match file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        if filled < PROGRESS_SIZE {
            return Ok(0);
        }
        Ok(u64::from_le_bytes(buf))
    }

    /// Snapshot `offset` atomically.
    ///
    /// Writes the scratch file, makes it durable, then renames it over the
    /// canonical file and syncs the directory.
    pub fn save(&self, offset: u64) -> io::Result<()> {
        {
            let mut tmp = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&self.tmp_path)?;
            tmp.write_all(&offset.to_le_bytes())?;

            // SAFETY: fdatasync is a standard POSIX syscall on a valid fd.
            let ret = unsafe { libc::fdatasync(tmp.as_raw_fd()) };
            if ret < 0 {
                return Err(io::Error::last_os_error());
            }
        }

        fs::rename(&self.tmp_path, &self.path)?;

        if let Some(parent) = self.path.parent() {
            if let Ok(dir) = File::open(parent) {
                // SAFETY: fsync is a standard POSIX syscall on a valid fd.
                unsafe { libc::fsync(dir.as_raw_fd()) };
            }
        }

        Ok(())
    }
}

/// Lock-free mirror of `sync_offset`.
///
/// The replicator publishes with Release after each acknowledged record; the
/// persister loads with Acquire. Monotonically non-decreasing.
pub struct SyncProgress {
    offset: AtomicU64,
}

impl SyncProgress {
    pub fn new(offset: u64) -> Self {
        SyncProgress {
            offset: AtomicU64::new(offset),
        }
    }

    /// Publish a new replicated offset.
    #[inline]
    pub fn advance(&self, offset: u64) {
        self.offset.store(offset, Ordering::Release);
    }

    /// Read the last published offset.
    #[inline]
    pub fn load(&self) -> u64 {
        self.offset.load(Ordering::Acquire)
    }
}
