//! MSSQL MCP Library
//!
//! Exposes Microsoft SQL Server databases (tables, schema, ad-hoc queries)
//! over the Model Context Protocol and a plain HTTP API, with multi-database
//! support. Untrusted SQL passes through a deny-list classifier before it
//! reaches the server; SELECT statements run inside read-committed
//! transactions and all results are normalized into a uniform envelope.
//!
//! # Usage as Library
//!
//! ```rust,ignore
//! use mssql_mcp::MssqlMcpServer;
//!
//! let server = MssqlMcpServer::new();
//! // Serve via stdio, or use the handlers module directly.
//! ```

pub mod config;
pub mod driver;
pub mod handlers;
pub mod init;
pub mod normalize;
pub mod params;
pub mod safety;
pub mod server;
pub mod types;
pub mod web;

// Re-export main server type
pub use server::MssqlMcpServer;

pub use init::init_tracing;
pub use types::{QueryOutcome, ResponseEnvelope};
