//! Replication configuration.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Per-attempt timeout handed to the AppendLog client.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(15);

/// Pause between retries of a failed AppendLog.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(5);

/// Interval between progress snapshots.
pub const DEFAULT_SNAPSHOT_INTERVAL: Duration = Duration::from_secs(10);

/// Name of the append-only record file.
pub const SYNC_LOG_FILE: &str = "sync.log";

/// Name of the progress snapshot file.
pub const PROGRESS_FILE: &str = "prog.log";

/// Scratch name used by the atomic-rename snapshot protocol.
pub const PROGRESS_TMP_FILE: &str = "prog.tmp";

/// Fixed role of this process, for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Accepts host writes and drives replication.
    Leader,
    /// Receives replicated entries and applies them locally.
    Follower,
}

impl FromStr for Role {
    type Err = ParseRoleError;

    /// Parses the configuration strings `"master"` and `"slave"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "master" => Ok(Role::Leader),
            "slave" => Ok(Role::Follower),
            other => Err(ParseRoleError {
                value: other.to_string(),
            }),
        }
    }
}

/// The configured role string was neither `"master"` nor `"slave"`.
#[derive(Debug)]
pub struct ParseRoleError {
    value: String,
}

impl fmt::Display for ParseRoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown role {:?}, expected \"master\" or \"slave\"", self.value)
    }
}

impl std::error::Error for ParseRoleError {}

/// Configuration supplied by the embedding process.
#[derive(Debug, Clone)]
pub struct ReplicationConfig {
    /// Fixed role for the process lifetime.
    pub role: Role,
    /// Network address of the follower; ignored on the follower itself.
    pub follower_addr: String,
    /// Directory holding the sync log and progress files.
    pub dir: PathBuf,
    /// Per-attempt timeout for each AppendLog call.
    pub rpc_timeout: Duration,
    /// Pause between retries of a failed AppendLog.
    pub retry_backoff: Duration,
    /// Interval between progress snapshots.
    pub snapshot_interval: Duration,
}

impl ReplicationConfig {
    /// Defaults: files in the current directory, 15s RPC timeout, 5s retry
    /// backoff, 10s snapshot interval.
    pub fn new(role: Role) -> Self {
        ReplicationConfig {
            role,
            follower_addr: String::new(),
            dir: PathBuf::from("."),
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            snapshot_interval: DEFAULT_SNAPSHOT_INTERVAL,
        }
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.join(SYNC_LOG_FILE)
    }

    pub fn progress_path(&self) -> PathBuf {
        self.dir.join(PROGRESS_FILE)
    }

    pub fn progress_tmp_path(&self) -> PathBuf {
        self.dir.join(PROGRESS_TMP_FILE)
    }
}
