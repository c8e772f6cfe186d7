//! JSON-RPC protocol layer: wire types and the stdio transport.

pub mod stdio;
pub mod types;

pub use stdio::StdioTransport;
pub use types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION, PROTOCOL_VERSION};
