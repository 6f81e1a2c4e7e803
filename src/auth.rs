//! User identifiers, redacted secrets, and the per-user OAuth credential model.

pub mod credential;
pub mod id;

pub use credential::*;
pub use id::*;
