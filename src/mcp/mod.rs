//! Model Context Protocol (MCP) session handling over JSON-RPC
//!
//! Decoding, per-session transport and state, capability negotiation, and the dispatcher
//! that routes each message and writes its reply.

pub mod dispatcher;
pub mod error;
pub mod message;
pub mod rpc;
pub mod server;
pub mod session;
pub mod transport;
