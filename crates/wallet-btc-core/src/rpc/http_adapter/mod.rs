//! Native JSON-RPC client for Bitcoin Core compatible endpoints.
//!
//! Implements [`NodeRpc`](super::NodeRpc) and [`TxSource`](super::TxSource)
//! over JSON-RPC using `reqwest`, with optional request rate limiting,
//! single and chunked batch calls, and basic auth.

mod client;
pub(crate) mod connection;

pub use client::HttpRpcClient;
