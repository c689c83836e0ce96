//! Session application services.

mod identity_store;

pub use identity_store::SessionIdentityStore;
