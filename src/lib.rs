//! Leader/follower log shipping for a nameserver write path.
//!
//! The leader appends opaque host entries to an append-only sync log on
//! local disk; a background replicator ships them, in order, to a single
//! follower over an AppendLog RPC and advances a durable progress marker as
//! the follower acknowledges. Hosts submit entries either blocking (wait for
//! the follower to catch up, subject to a timeout) or async (a completion
//! callback fires once the entry is acknowledged). The follower persists
//! each received entry to its own sync log and hands it to a host-supplied
//! apply callback.
//!
//! When the follower falls behind, a timed-out blocking submit switches the
//! leader into master-only mode: it keeps accepting entries without waiting.
//! The mode clears as soon as a blocking submit observes the follower fully
//! caught up again.
//!
//! The wire RPC framework is not part of this crate. The replicator talks to
//! the follower through the [`rpc::AppendLogClient`] trait ("send one
//! AppendLog, blocking, with a per-attempt timeout"); an in-process
//! channel-backed implementation is provided for tests and single-machine
//! wiring.

pub mod engine;
pub mod replica;
pub mod rpc;

pub use replica::config::{ReplicationConfig, Role};
pub use replica::coordinator::{ApplyCallback, Coordinator};
pub use replica::handler::AppendLogServer;
pub use rpc::message::{AppendLogRequest, AppendLogResponse};
pub use rpc::transport::{channel_pair, AppendLogClient, RpcError};
