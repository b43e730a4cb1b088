use std::fmt;
use std::io;

/// Failures while reading records back out of the sync log.
///
/// Both short-read variants mean the record is torn: the cursor only reads
/// bytes below `current_offset`, all written by this process, so there is no
/// "writer has not flushed yet" case to retry.
#[derive(Debug)]
pub enum LogError {
    /// Fewer than 4 bytes were available for the length prefix.
    ShortRead {
        offset: u64,
        expected: usize,
        got: usize,
    },

    /// The payload ended before the length prefix said it would.
    IncompleteRecord {
        offset: u64,
        expected: usize,
        got: usize,
    },

    /// IO error from the underlying file.
    Io(io::Error),
}

impl fmt::Display for LogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogError::ShortRead { offset, expected, got } => {
                write!(
                    f,
                    "short read at offset {}: expected {} prefix bytes, got {}",
                    offset, expected, got
                )
            }
            LogError::IncompleteRecord { offset, expected, got } => {
                write!(
                    f,
                    "incomplete record at offset {}: expected {} payload bytes, got {}",
                    offset, expected, got
                )
            }
            LogError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for LogError {}

impl From<io::Error> for LogError {
    fn from(e: io::Error) -> Self {
        LogError::Io(e)
    }
}

/// Startup failures. Callers treat every variant as fatal: the process has
/// no useful degraded mode without its on-disk state.
#[derive(Debug)]
pub enum InitError {
    /// Could not open the sync log for appending.
    OpenLog(io::Error),

    /// Could not open the sync log read cursor.
    OpenCursor(io::Error),

    /// Could not read the progress file (absence is not an error).
    OpenProgress(io::Error),

    /// The progress file claims more bytes replicated than the log holds.
    ProgressAhead {
        current_offset: u64,
        sync_offset: u64,
    },

    /// Leader role configured but no AppendLog client supplied.
    MissingTransport,

    /// Could not spawn a background worker thread.
    Spawn(io::Error),
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::OpenLog(e) => write!(f, "open sync log for append failed: {}", e),
            InitError::OpenCursor(e) => write!(f, "open sync log for read failed: {}", e),
            InitError::OpenProgress(e) => write!(f, "open progress file failed: {}", e),
            InitError::ProgressAhead { current_offset, sync_offset } => {
                write!(
                    f,
                    "progress file ahead of sync log: current_offset={} sync_offset={}",
                    current_offset, sync_offset
                )
            }
            InitError::MissingTransport => {
                write!(f, "leader role requires an AppendLog client")
            }
            InitError::Spawn(e) => write!(f, "spawn worker thread failed: {}", e),
        }
    }
}

impl std::error::Error for InitError {}
