//! Follower-side AppendLog serving.
//!
//! [`Coordinator::handle_append_log`] does the real work; this module pumps
//! requests from a transport endpoint into it on a dedicated thread.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use log::debug;

use crate::replica::coordinator::Coordinator;
use crate::rpc::transport::ChannelServerEndpoint;

/// How long each poll waits before re-checking the exiting flag.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Serving loop feeding AppendLog requests to a follower coordinator.
pub struct AppendLogServer {
    exiting: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl AppendLogServer {
    /// Spawn the serving thread.
    ///
    /// Each request is persisted and applied synchronously before its reply
    /// is sent, so an ack means the follower holds the entry.
    pub fn spawn(
        coordinator: Arc<Coordinator>,
        endpoint: ChannelServerEndpoint,
    ) -> io::Result<Self> {
        let exiting = Arc::new(AtomicBool::new(false));
        let exiting_flag = exiting.clone();

        let handle = thread::Builder::new()
            .name("appendlog-server".to_string())
            .spawn(move || {
                while !exiting_flag.load(Ordering::SeqCst) {
                    match endpoint.recv_timeout(POLL_INTERVAL) {
                        Ok((request, reply)) => {
                            debug!("received AppendLog: len={}", request.log_data.len());
                            let response = coordinator.handle_append_log(&request);
                            // A vanished caller gave up on the reply; the
                            // entry is persisted either way.
                            let _ = reply.send(response);
                        }
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })?;

        Ok(AppendLogServer {
            exiting,
            handle: Some(handle),
        })
    }

    /// Stop the serving thread and wait for it to finish.
    pub fn shutdown(&mut self) {
        self.exiting.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for AppendLogServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
