pub mod message;
pub mod transport;

pub use message::{AppendLogRequest, AppendLogResponse};
pub use transport::{channel_pair, AppendLogClient, ChannelClient, ChannelServerEndpoint, RpcError};
