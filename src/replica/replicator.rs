//! Background replication worker, active only on the leader.
//!
//! Consumes the sync log from `sync_offset`, ships each record to the
//! follower in append order, advances `sync_offset` one whole record at a
//! time, fires completion callbacks in ascending offset order, and wakes
//! blocking submits when the follower has caught up.

use std::io;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, warn};

use crate::engine::log::{record_size, LogCursor};
use crate::replica::coordinator::{sleep_observing_exit, CoordinatorInner};
use crate::rpc::message::AppendLogRequest;
use crate::rpc::transport::AppendLogClient;

pub(crate) fn spawn(
    inner: Arc<CoordinatorInner>,
    cursor: LogCursor,
    client: Box<dyn AppendLogClient>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("replicator".to_string())
        .spawn(move || run(inner, cursor, client))
}

fn run(inner: Arc<CoordinatorInner>, mut cursor: LogCursor, client: Box<dyn AppendLogClient>) {
    loop {
        {
            let mut shared = inner.shared.lock().unwrap();
            while !inner.exiting.load(Ordering::SeqCst)
                && shared.sync_offset == shared.log.current_offset()
            {
                shared = inner.replicator_cv.wait(shared).unwrap();
            }
        }
        if inner.exiting.load(Ordering::SeqCst) {
            return;
        }
        if drain(&inner, &mut cursor, &*client) {
            return;
        }
    }
}

/// Ship records until the follower holds everything appended so far.
/// Returns true when interrupted by shutdown.
fn drain(inner: &CoordinatorInner, cursor: &mut LogCursor, client: &dyn AppendLogClient) -> bool {
    loop {
        {
            let shared = inner.shared.lock().unwrap();
            if shared.sync_offset == shared.log.current_offset() {
                return false;
            }
            debug!(
                "replicating: sync_offset={} current_offset={}",
                shared.sync_offset,
                shared.log.current_offset()
            );
        }

        let payload = match cursor.read_record() {
            Ok(payload) => payload,
            Err(e) => panic!("FATAL: torn record in sync log: {}", e),
        };
        let request = AppendLogRequest { log_data: payload };

        // The mutex stays released across the RPC so submits can progress
        // while the follower is slow. Retry forever: skipping an entry
        // would desynchronize the follower permanently.
        loop {
            match client.append_log(&request, inner.config.rpc_timeout) {
                Ok(response) if response.success => break,
                Ok(_) => warn!("follower rejected AppendLog, retrying"),
                Err(e) => warn!("AppendLog failed ({}), retrying", e),
            }
            if sleep_observing_exit(&inner.exiting, inner.config.retry_backoff) {
                return true;
            }
        }

        let callback = {
            let mut shared = inner.shared.lock().unwrap();
            let entry_start = shared.sync_offset;
            let callback = shared.callbacks.take(entry_start);
            if callback.is_none() {
                // Blocking submits register no callback, and a restarted
                // leader re-ships records whose callbacks died with the
                // previous process.
                debug!("no completion callback at offset {}", entry_start);
            }
            shared.sync_offset = entry_start + record_size(request.log_data.len());
            inner.synced.advance(shared.sync_offset);
            debug!(
                "replicated record: sync_offset={} current_offset={}",
                shared.sync_offset,
                shared.log.current_offset()
            );
            if shared.sync_offset == shared.log.current_offset() {
                inner.completion_cv.notify_all();
            }
            callback
        };

        // Fired outside the mutex: the host callback may take its own locks.
        if let Some(callback) = callback {
            callback(true);
        }
    }
}
