//! Append-only sync log storage.
//!
//! On-disk format: `{u32-le length, byte[length] payload}*` laid out
//! contiguously from offset 0. One [`SyncLog`] append handle and one
//! [`LogCursor`] read handle share the file but not their positions.
//!
//! # Thread Safety
//!
//! The append handle is mutated only under the coordinator mutex; the cursor
//! is owned by the replicator thread and never reads at or past
//! `current_offset`. No fsync is issued on the sync log: a crash right after
//! an append may lose the freshest records, and the progress snapshot
//! protocol is what bounds replay on restart.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::engine::errors::LogError;

/// Size of the record length prefix.
pub const RECORD_PREFIX_LEN: u64 = 4;

/// Total on-disk size of a record holding `payload_len` payload bytes.
pub fn record_size(payload_len: usize) -> u64 {
    RECORD_PREFIX_LEN + payload_len as u64
}

/// Append handle for the sync log.
///
/// Owns `current_offset`: the number of bytes appended since file creation,
/// not since process start.
pub struct SyncLog {
    file: File,
    current_offset: u64,
}

impl SyncLog {
    /// Open or create the sync log for appending.
    ///
    /// `current_offset` starts at the current end of file so a restarted
    /// process continues where the previous one stopped.
    pub fn open(path: &Path) -> io::Result<Self> {
        let mut file = OpenOptions::new().write(true).create(true).open(path)?;
        let current_offset = file.seek(SeekFrom::End(0))?;
        Ok(SyncLog {
            file,
            current_offset,
        })
    }

    /// Append one length-prefixed record.
    ///
    /// Returns the number of bytes written, always `4 + payload.len()`. A
    /// failed or short write leaves a possibly torn record on disk and is
    /// propagated for the caller to treat as fatal.
    ///
    /// # Panics
    /// Panics if the payload does not fit the `u32` length prefix.
    pub fn append(&mut self, payload: &[u8]) -> io::Result<u64> {
        if payload.len() > u32::MAX as usize {
            panic!(
                "FATAL: entry of {} bytes exceeds the u32 length prefix",
                payload.len()
            );
        }

        let len = payload.len() as u32;
        self.file.write_all(&len.to_le_bytes())?;
        self.file.write_all(payload)?;

        let written = record_size(payload.len());
        self.current_offset += written;
        Ok(written)
    }

    /// Bytes appended to the log since file creation.
    pub fn current_offset(&self) -> u64 {
        self.current_offset
    }
}

/// Sequential read cursor over the sync log.
///
/// Positioned at `sync_offset` on startup and advanced one whole record per
/// [`read_record`](LogCursor::read_record).
pub struct LogCursor {
    file: File,
    position: u64,
}

impl LogCursor {
    /// Open a separate read handle and seek it to `start_offset`.
    pub fn open(path: &Path, start_offset: u64) -> io::Result<Self> {
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(start_offset))?;
        Ok(LogCursor {
            file,
            position: start_offset,
        })
    }

    /// Read the next record's payload.
    ///
    /// The buffer is sized to the record length and returned to the caller.
    /// [`LogError::ShortRead`] and [`LogError::IncompleteRecord`] both mean
    /// a torn append.
    pub fn read_record(&mut self) -> Result<Vec<u8>, LogError> {
        let mut prefix = [0u8; RECORD_PREFIX_LEN as usize];
        let got = read_full(&mut self.file, &mut prefix)?;
        if got < prefix.len() {
            return Err(LogError::ShortRead {
                offset: self.position,
                expected: prefix.len(),
                got,
            });
        }

        let len = u32::from_le_bytes(prefix) as usize;
        let mut payload = vec![0u8; len];
        let got = read_full(&mut self.file, &mut payload)?;
        if got < len {
            return Err(LogError::IncompleteRecord {
                offset: self.position,
                expected: len,
                got,
            });
        }

        self.position += record_size(len);
        Ok(payload)
    }

    /// Current byte position of the cursor.
    pub fn position(&self) -> u64 {
        self.position
    }
}

/// Read until `buf` is full or EOF. EOF is reported through the returned
/// count, not as an error.
fn read_full(file: &mut File, buf: &mut [u8]) -> Result<usize, LogError> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(LogError::Io(e)),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_record_layout_is_little_endian_prefix() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sync.log");

        let mut log = SyncLog::open(&path).unwrap();
        assert_eq!(log.append(b"hi").unwrap(), 6);
        assert_eq!(log.append(b"abc").unwrap(), 7);
        assert_eq!(log.current_offset(), 13);

        let bytes = fs::read(&path).unwrap();
        assert_eq!(
            bytes,
            vec![0x02, 0x00, 0x00, 0x00, b'h', b'i', 0x03, 0x00, 0x00, 0x00, b'a', b'b', b'c']
        );
    }

    #[test]
    fn test_append_then_read_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sync.log");

        let mut log = SyncLog::open(&path).unwrap();
        log.append(b"first").unwrap();
        log.append(b"").unwrap();
        log.append(b"third entry").unwrap();

        let mut cursor = LogCursor::open(&path, 0).unwrap();
        assert_eq!(cursor.read_record().unwrap(), b"first");
        assert_eq!(cursor.read_record().unwrap(), b"");
        assert_eq!(cursor.read_record().unwrap(), b"third entry");
        assert_eq!(cursor.position(), log.current_offset());
    }

    #[test]
    fn test_cursor_starts_mid_log() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sync.log");

        let mut log = SyncLog::open(&path).unwrap();
        let first = log.append(b"skipped").unwrap();
        log.append(b"wanted").unwrap();

        let mut cursor = LogCursor::open(&path, first).unwrap();
        assert_eq!(cursor.read_record().unwrap(), b"wanted");
    }

    #[test]
    fn test_reopen_resumes_at_end_of_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sync.log");

        {
            let mut log = SyncLog::open(&path).unwrap();
            log.append(b"persisted").unwrap();
        }

        let log = SyncLog::open(&path).unwrap();
        assert_eq!(log.current_offset(), record_size(b"persisted".len()));
    }

    #[test]
    fn test_short_prefix_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sync.log");
        fs::write(&path, [0x05, 0x00]).unwrap();

        let mut cursor = LogCursor::open(&path, 0).unwrap();
        match cursor.read_record() {
            Err(LogError::ShortRead { offset: 0, expected: 4, got: 2 }) => {}
            other => panic!("expected ShortRead, got {:?}", other),
        }
    }

    #[test]
    fn test_truncated_payload_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sync.log");
        // Prefix says 5 bytes, only 3 follow.
        fs::write(&path, [0x05, 0x00, 0x00, 0x00, b'a', b'b', b'c']).unwrap();

        let mut cursor = LogCursor::open(&path, 0).unwrap();
        match cursor.read_record() {
            Err(LogError::IncompleteRecord { offset: 0, expected: 5, got: 3 }) => {}
            other => panic!("expected IncompleteRecord, got {:?}", other),
        }
    }

    #[test]
    fn test_cursor_sees_writes_from_append_handle() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sync.log");

        let mut log = SyncLog::open(&path).unwrap();
        let mut cursor = LogCursor::open(&path, 0).unwrap();

        log.append(b"one").unwrap();
        assert_eq!(cursor.read_record().unwrap(), b"one");

        log.append(b"two").unwrap();
        assert_eq!(cursor.read_record().unwrap(), b"two");
    }
}
