//! Transport seam for the AppendLog RPC.
//!
//! The replicator only ever needs one primitive: send an AppendLog request
//! and block, up to a per-attempt timeout, for the reply.
//! [`AppendLogClient`] captures that primitive so the embedding process can
//! plug in its own RPC framework. [`channel_pair`] provides an in-process
//! implementation over crossbeam channels, used by the tests and by
//! single-machine wiring; its `connected` flag lets tests stall the link.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};

use crate::rpc::message::{AppendLogRequest, AppendLogResponse};

/// Failure modes of a single AppendLog attempt.
#[derive(Debug)]
pub enum RpcError {
    /// No reply within the per-attempt timeout.
    Timeout { timeout: Duration },

    /// The remote side is gone for good.
    Disconnected,
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcError::Timeout { timeout } => {
                write!(f, "AppendLog timed out after {:?}", timeout)
            }
            RpcError::Disconnected => write!(f, "AppendLog endpoint disconnected"),
        }
    }
}

impl std::error::Error for RpcError {}

/// Blocking AppendLog primitive.
///
/// One attempt per call; the retry policy belongs to the caller.
pub trait AppendLogClient: Send {
    fn append_log(
        &self,
        request: &AppendLogRequest,
        timeout: Duration,
    ) -> Result<AppendLogResponse, RpcError>;
}

type Envelope = (AppendLogRequest, Sender<AppendLogResponse>);

/// Leader-side end of the in-process loopback transport.
#[derive(Clone)]
pub struct ChannelClient {
    tx: Sender<Envelope>,
    connected: Arc<AtomicBool>,
}

impl ChannelClient {
    /// Simulate a network partition. Requests sent while disconnected time
    /// out instead of reaching the endpoint.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl AppendLogClient for ChannelClient {
    fn append_log(
        &self,
        request: &AppendLogRequest,
        timeout: Duration,
    ) -> Result<AppendLogResponse, RpcError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(RpcError::Timeout { timeout });
        }

        let (reply_tx, reply_rx) = bounded(1);
        self.tx
            .send((request.clone(), reply_tx))
            .map_err(|_| RpcError::Disconnected)?;

        match reply_rx.recv_timeout(timeout) {
            Ok(response) => Ok(response),
            Err(RecvTimeoutError::Timeout) => Err(RpcError::Timeout { timeout }),
            Err(RecvTimeoutError::Disconnected) => Err(RpcError::Disconnected),
        }
    }
}

/// Follower-side end of the in-process loopback transport.
pub struct ChannelServerEndpoint {
    rx: Receiver<Envelope>,
}

impl ChannelServerEndpoint {
    /// Receive the next request, waiting at most `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Envelope, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Create a connected client/endpoint pair.
pub fn channel_pair() -> (ChannelClient, ChannelServerEndpoint) {
    let (tx, rx) = unbounded();
    (
        ChannelClient {
            tx,
            connected: Arc::new(AtomicBool::new(true)),
        },
        ChannelServerEndpoint { rx },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_channel_pair_round_trip() {
        let (client, endpoint) = channel_pair();

        let server = thread::spawn(move || {
            let (request, reply) = endpoint.recv_timeout(Duration::from_secs(1)).unwrap();
            assert_eq!(request.log_data, b"entry");
            reply.send(AppendLogResponse { success: true }).unwrap();
        });

        let request = AppendLogRequest {
            log_data: b"entry".to_vec(),
        };
        let response = client
            .append_log(&request, Duration::from_secs(1))
            .unwrap();
        assert!(response.success);

        server.join().unwrap();
    }

    #[test]
    fn test_unserved_request_times_out() {
        let (client, _endpoint) = channel_pair();

        let request = AppendLogRequest {
            log_data: b"entry".to_vec(),
        };
        match client.append_log(&request, Duration::from_millis(20)) {
            Err(RpcError::Timeout { .. }) => {}
            other => panic!("expected Timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_disconnected_link_times_out_without_delivery() {
        let (client, endpoint) = channel_pair();
        client.set_connected(false);

        let request = AppendLogRequest {
            log_data: b"entry".to_vec(),
        };
        match client.append_log(&request, Duration::from_millis(20)) {
            Err(RpcError::Timeout { .. }) => {}
            other => panic!("expected Timeout, got {:?}", other),
        }

        // Nothing reached the endpoint.
        assert!(endpoint.recv_timeout(Duration::from_millis(20)).is_err());

        client.set_connected(true);
        assert!(client.is_connected());
    }

    #[test]
    fn test_dropped_endpoint_is_disconnected() {
        let (client, endpoint) = channel_pair();
        drop(endpoint);

        let request = AppendLogRequest {
            log_data: b"entry".to_vec(),
        };
        match client.append_log(&request, Duration::from_millis(20)) {
            Err(RpcError::Disconnected) => {}
            other => panic!("expected Disconnected, got {:?}", other),
        }
    }
}
