//! Local mailbox bridge: MCP server internals
//!
//! Library surface backing the `mail-bridge-mcp-rs` binary and the
//! integration tests. See the binary crate docs for the architecture
//! overview.

pub mod cache;
pub mod chain;
pub mod config;
pub mod errors;
pub mod mailbox;
pub mod models;
pub mod search;
pub mod server;
pub mod store;
