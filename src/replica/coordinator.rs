//! Coordinator: the facade binding the sync log, progress store, callback
//! registry, transport, and background workers.
//!
//! # Locking
//!
//! One mutex guards `current_offset` (inside [`SyncLog`]), `sync_offset`,
//! `master_only`, and the callback registry. Two condvars hang off it:
//!
//! - `replicator_cv`: signaled by the submit paths after appending, waited
//!   on by the replicator.
//! - `completion_cv`: signaled by the replicator when `sync_offset` catches
//!   `current_offset`, waited on by blocking submits.
//!
//! The replicator releases the mutex across each RPC so submits keep
//! flowing while the follower is slow. The persister never takes the mutex;
//! it reads the [`SyncProgress`] mirror.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::engine::errors::InitError;
use crate::engine::log::{LogCursor, SyncLog};
use crate::engine::progress::{ProgressStore, SyncProgress};
use crate::replica::callbacks::CallbackRegistry;
use crate::replica::config::{ReplicationConfig, Role};
use crate::replica::{persister, replicator};
use crate::rpc::message::{AppendLogRequest, AppendLogResponse};
use crate::rpc::transport::AppendLogClient;

/// Apply hook invoked on the follower once per received entry, on the
/// thread serving the RPC. Must not block indefinitely.
pub type ApplyCallback = Box<dyn Fn(&[u8]) + Send + Sync>;

/// Granularity at which worker sleeps observe the exiting flag.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// State guarded by the coordinator mutex.
pub(crate) struct SyncShared {
    pub(crate) log: SyncLog,
    /// Bytes acknowledged by the follower. `sync_offset <= current_offset`
    /// always; advances only in whole-record increments.
    pub(crate) sync_offset: u64,
    /// True while the leader accepts entries without waiting for the
    /// follower.
    pub(crate) master_only: bool,
    pub(crate) callbacks: CallbackRegistry,
}

pub(crate) struct CoordinatorInner {
    pub(crate) config: ReplicationConfig,
    pub(crate) shared: Mutex<SyncShared>,
    pub(crate) replicator_cv: Condvar,
    pub(crate) completion_cv: Condvar,
    /// Mirror of `sync_offset` for the persister.
    pub(crate) synced: SyncProgress,
    pub(crate) progress: ProgressStore,
    pub(crate) exiting: AtomicBool,
    apply_callback: Mutex<Option<ApplyCallback>>,
}

/// The replication facade.
///
/// On the leader, [`submit`](Coordinator::submit) and
/// [`submit_async`](Coordinator::submit_async) append locally and the
/// background replicator ships to the follower. On the follower,
/// [`handle_append_log`](Coordinator::handle_append_log) persists and
/// applies incoming entries.
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
    replicator: Mutex<Option<thread::JoinHandle<()>>>,
    persister: Mutex<Option<thread::JoinHandle<()>>>,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator").finish_non_exhaustive()
    }
}

impl Coordinator {
    /// Open the on-disk state and start the background workers.
    ///
    /// Recovers `sync_offset` from the progress file (0 when absent), opens
    /// the sync log for append with `current_offset` at end-of-file, and
    /// seeks the read cursor to `sync_offset`. The leader requires an
    /// AppendLog client for the configured follower; the follower ignores
    /// it.
    pub fn start(
        config: ReplicationConfig,
        client: Option<Box<dyn AppendLogClient>>,
    ) -> Result<Self, InitError> {
        let progress = ProgressStore::new(config.progress_path(), config.progress_tmp_path());
        let sync_offset = progress.load().map_err(InitError::OpenProgress)?;

        let log = SyncLog::open(&config.log_path()).map_err(InitError::OpenLog)?;
        let current_offset = log.current_offset();
        if current_offset < sync_offset {
            return Err(InitError::ProgressAhead {
                current_offset,
                sync_offset,
            });
        }

        let cursor =
            LogCursor::open(&config.log_path(), sync_offset).map_err(InitError::OpenCursor)?;

        info!(
            "sync starting as {:?}: current_offset={} sync_offset={}",
            config.role, current_offset, sync_offset
        );

        let role = config.role;
        let inner = Arc::new(CoordinatorInner {
            shared: Mutex::new(SyncShared {
                log,
                sync_offset,
                master_only: false,
                callbacks: CallbackRegistry::new(),
            }),
            replicator_cv: Condvar::new(),
            completion_cv: Condvar::new(),
            synced: SyncProgress::new(sync_offset),
            progress,
            exiting: AtomicBool::new(false),
            apply_callback: Mutex::new(None),
            config,
        });

        let (replicator, persister) = match role {
            Role::Leader => {
                let client = client.ok_or(InitError::MissingTransport)?;
                let replicator = replicator::spawn(inner.clone(), cursor, client)
                    .map_err(InitError::Spawn)?;
                let persister = persister::spawn(inner.clone()).map_err(InitError::Spawn)?;
                (Some(replicator), Some(persister))
            }
            Role::Follower => (None, None),
        };

        Ok(Coordinator {
            inner,
            replicator: Mutex::new(replicator),
            persister: Mutex::new(persister),
        })
    }

    /// The configured role; fixed for the process lifetime.
    pub fn role(&self) -> Role {
        self.inner.config.role
    }

    pub fn is_leader(&self) -> bool {
        self.inner.config.role == Role::Leader
    }

    /// Register the follower-side apply hook.
    pub fn set_apply_callback(&self, callback: ApplyCallback) {
        *self.inner.apply_callback.lock().unwrap() = Some(callback);
    }

    /// Append an entry and wait, up to `timeout`, for the follower to catch
    /// up. Always returns `true`.
    ///
    /// In master-only mode with the follower still behind this entry, the
    /// call returns without waiting. Otherwise it waits until `sync_offset`
    /// catches the live `current_offset`: entries appended concurrently
    /// extend this call's wait even after its own entry is acknowledged. A
    /// deadline miss switches on master-only mode; observing full catch-up
    /// switches it off.
    ///
    /// # Panics
    /// Panics on a follower and on sync-log write failure.
    pub fn submit(&self, entry: &[u8], timeout: Duration) -> bool {
        self.assert_leader();
        let start = Instant::now();
        let deadline = start + timeout;

        let mut shared = self.inner.shared.lock().unwrap();
        let entry_start = shared.log.current_offset();
        append_locked(&mut shared, entry);
        self.inner.replicator_cv.notify_one();

        if shared.master_only && shared.sync_offset < entry_start {
            warn!(
                "sync in master-only mode, not waiting: sync_offset={} entry_start={}",
                shared.sync_offset, entry_start
            );
            return true;
        }

        loop {
            if shared.sync_offset == shared.log.current_offset() {
                if shared.master_only {
                    info!("sync leaves master-only mode");
                    shared.master_only = false;
                }
                debug!("sync submit completed in {:?}", start.elapsed());
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let (guard, _) = self
                .inner
                .completion_cv
                .wait_timeout(shared, deadline - now)
                .unwrap();
            shared = guard;
        }

        warn!(
            "sync submit timed out after {:?}, entering master-only mode: sync_offset={} current_offset={}",
            timeout,
            shared.sync_offset,
            shared.log.current_offset()
        );
        shared.master_only = true;
        true
    }

    /// Append an entry and register `callback` to fire with `true` once the
    /// follower acknowledges it. Returns immediately.
    ///
    /// The callback runs on the replicator thread; keep it short and do not
    /// call back into `submit` from it. At shutdown, callbacks not yet
    /// fired are invoked with `false`.
    ///
    /// # Panics
    /// Panics on a follower and on sync-log write failure.
    pub fn submit_async(&self, entry: &[u8], callback: impl FnOnce(bool) + Send + 'static) {
        self.assert_leader();
        let mut shared = self.inner.shared.lock().unwrap();
        let entry_start = shared.log.current_offset();
        append_locked(&mut shared, entry);
        shared.callbacks.insert(entry_start, Box::new(callback));
        self.inner.replicator_cv.notify_one();
    }

    /// Follower-side AppendLog handler: persist the entry, apply it, ack.
    ///
    /// The apply callback runs synchronously on the calling thread; a
    /// not-yet-registered callback is skipped, never failed.
    pub fn handle_append_log(&self, request: &AppendLogRequest) -> AppendLogResponse {
        {
            let mut shared = self.inner.shared.lock().unwrap();
            append_locked(&mut shared, &request.log_data);
        }
        if let Some(callback) = self.inner.apply_callback.lock().unwrap().as_ref() {
            callback(&request.log_data);
        }
        AppendLogResponse { success: true }
    }

    /// Bytes appended to the local sync log.
    pub fn current_offset(&self) -> u64 {
        self.inner.shared.lock().unwrap().log.current_offset()
    }

    /// Bytes acknowledged by the follower.
    pub fn sync_offset(&self) -> u64 {
        self.inner.shared.lock().unwrap().sync_offset
    }

    /// Whether the leader is currently accepting entries without waiting.
    pub fn is_master_only(&self) -> bool {
        self.inner.shared.lock().unwrap().master_only
    }

    /// Stop the background workers, fire abandoned async callbacks with
    /// `false`, and take a final progress snapshot on the leader.
    ///
    /// Idempotent; also invoked by `Drop`.
    pub fn shutdown(&self) {
        if self.inner.exiting.swap(true, Ordering::SeqCst) {
            return;
        }

        {
            // Hold the mutex so workers cannot miss the wakeup between
            // checking the flag and parking on a condvar.
            let _shared = self.inner.shared.lock().unwrap();
            self.inner.replicator_cv.notify_all();
            self.inner.completion_cv.notify_all();
        }

        if let Some(handle) = self.replicator.lock().unwrap().take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.persister.lock().unwrap().take() {
            let _ = handle.join();
        }

        let abandoned = self.inner.shared.lock().unwrap().callbacks.drain();
        for (offset, callback) in abandoned {
            warn!("abandoning completion callback at offset {} on shutdown", offset);
            callback(false);
        }

        if self.is_leader() {
            let offset = self.inner.synced.load();
            if let Err(e) = self.inner.progress.save(offset) {
                warn!("final progress snapshot failed: {}", e);
            }
        }
    }

    fn assert_leader(&self) {
        if !self.is_leader() {
            panic!("FATAL: follower does not accept local submissions");
        }
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Append under the mutex; a write failure leaves a possibly torn log and
/// takes the process down.
fn append_locked(shared: &mut SyncShared, entry: &[u8]) -> u64 {
    match shared.log.append(entry) {
        Ok(len) => len,
        Err(e) => panic!("FATAL: sync log append failed: {}", e),
    }
}

/// Sleep for `duration`, waking early on shutdown.
/// Returns true when the process is exiting.
pub(crate) fn sleep_observing_exit(exiting: &AtomicBool, duration: Duration) -> bool {
    let mut remaining = duration;
    while remaining > Duration::ZERO {
        if exiting.load(Ordering::SeqCst) {
            return true;
        }
        let slice = remaining.min(EXIT_POLL_INTERVAL);
        thread::sleep(slice);
        remaining -= slice;
    }
    exiting.load(Ordering::SeqCst)
}
