//! Session registry.
//!
//! - [`SessionStorage`]: the registry interface the session manager depends on
//! - [`DashMapSessionStorage`]: lock-free implementation backed by `DashMap`
//! - [`SessionSlot`]: the per-session record stored in the registry

mod session;
mod slot;
mod traits;

pub use session::DashMapSessionStorage;
pub use slot::{CloseStart, SessionSlot, SlotMeta, SlotResources};
pub use traits::SessionStorage;

#[cfg(test)]
pub(crate) use slot::tests::sample_meta;
