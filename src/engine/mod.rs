pub mod errors;
pub mod log;
pub mod progress;

pub use errors::{InitError, LogError};
pub use log::{record_size, LogCursor, SyncLog, RECORD_PREFIX_LEN};
pub use progress::{ProgressStore, SyncProgress};
