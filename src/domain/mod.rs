//! Tool definitions, their schemas, and the registry that validates and invokes them
//!
//! Provides the leaf components of the protocol core: the schema validator and the
//! tool registry shared read-only by every session.

pub mod content;
pub mod registry;
pub mod schema;
pub mod tools;
