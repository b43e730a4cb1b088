//! Background progress persister, active only on the leader.
//!
//! Periodically snapshots `sync_offset` through the progress store. Reads
//! only the atomic mirror; no coordination with the replicator beyond that.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::debug;

use crate::replica::coordinator::{sleep_observing_exit, CoordinatorInner};

pub(crate) fn spawn(inner: Arc<CoordinatorInner>) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("progress-persister".to_string())
        .spawn(move || run(inner))
}

fn run(inner: Arc<CoordinatorInner>) {
    loop {
        if sleep_observing_exit(&inner.exiting, inner.config.snapshot_interval) {
            return;
        }
        let offset = inner.synced.load();
        if let Err(e) = inner.progress.save(offset) {
            panic!("FATAL: progress snapshot failed: {}", e);
        }
        debug!("progress snapshot: sync_offset={}", offset);
    }
}
