//! HTTP transport layer for tool-invocation sessions
//!
//! Provides the external API routing: the session endpoint, health, and discovery.

pub mod handlers;
