//! Authentication strategies for SSH connections.
//!
//! Each [`Credential`](crate::mcp::credentials::Credential) variant maps to one
//! strategy. [`build_auth_chain`] turns a stored credential into the chain the
//! SSH connector runs after the handshake.
//!
//! # Available Strategies
//!
//! - [`PasswordAuth`]: Password-based authentication
//! - [`KeyAuth`]: Private key from a file or inline PEM text
//! - [`AgentAuth`]: SSH agent authentication
//!
//! # Example
//!
//! ```ignore
//! use kube_ssh_mcp::mcp::auth::build_auth_chain;
//!
//! let chain = build_auth_chain(&credential);
//! let accepted = chain.authenticate(&mut handle, "dev").await?;
//! ```

mod agent;
mod chain;
mod key;
mod password;
mod traits;

pub use agent::AgentAuth;
pub use chain::{AuthChain, build_auth_chain};
pub use key::{KeySource, KeyAuth};
pub use password::PasswordAuth;
pub use traits::AuthStrategy;
