//! Agent-facing transport for the console bridge.
//!
//! Provides:
//! - Wire protocol (tagged JSON frames)
//! - `ConnectionManager` with inbound dispatch and liveness probing
//! - `RpcCorrelator` for remote commands with timeouts
//! - WebSocket endpoint (feature: websocket)

pub mod connection;
pub mod protocol;
pub mod rpc;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use connection::{ConnectionConfig, ConnectionId, ConnectionManager, ConnectionState};
pub use protocol::{AgentMessage, Command, ServerMessage};
pub use rpc::{PageInfo, RpcCorrelator, RpcError};
