//! SSH sessions and the Kubernetes contexts reached through them, exposed as MCP tools.
//!
//! This module is organized into the following submodules:
//!
//! - `manager`: Session registry, lifecycle, capacity and the idle reaper
//! - `commands`: MCP tool implementations
//! - `transport`: Traits the manager drives for SSH (`Connector`, `RemoteShell`)
//! - `client`: russh implementation of the transport traits
//! - `auth`: SSH authentication strategies
//! - `cluster`: Kubeconfig validation and the Kubernetes client traits
//! - `credentials`: Session-scoped secret storage
//! - `storage`: Session slots and the registry behind them
//! - `config`: Configuration resolution with environment variable support
//! - `error`: Error taxonomy and retry classification
//! - `types`: Serializable response types for MCP tools

pub(crate) mod auth;
pub(crate) mod client;
pub mod cluster;
pub mod commands;
pub mod config;
pub mod credentials;
pub mod error;
pub mod manager;
pub(crate) mod schema;
pub(crate) mod session;
pub(crate) mod storage;
pub mod transport;
pub mod types;

pub use commands::McpKubeSshCommands;
pub use manager::SessionManager;
