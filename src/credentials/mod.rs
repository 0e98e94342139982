//! Provider credential resolution.
//!
//! Tokens come from the `user_connections` store first; any mapped field
//! still missing is looked up in the OS keychain and then the process
//! environment, keyed by its environment variable name.

pub mod keychain;
pub mod resolver;

pub use resolver::{CredentialResolver, ResolvedCredentials, TokenRequirements};
