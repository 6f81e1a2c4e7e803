//! Inbound webhook trust boundary.
//!
//! Deliveries carry a `t=<unix seconds>,v1=<hex digest>` header where the digest is
//! HMAC-SHA256 over `"{t}.{payload}"` keyed with the base64 body of a `whsec_` secret.
//! [`signature`] verifies that header; [`event`] parses verified payloads; [`endpoint`] glues
//! both to a [`directory::UserDirectory`] and maps every outcome to an HTTP-shaped response.

pub mod directory;
pub mod endpoint;
pub mod event;
pub mod signature;

pub use directory::*;
pub use endpoint::*;
pub use event::*;
pub use signature::*;

// self
use crate::_prelude::*;

/// Header carrying the delivery signature.
pub const SIGNATURE_HEADER: &str = "Clerk-Signature";
/// Conventional prefix of signing secrets; stripped before base64 decoding.
pub const SECRET_PREFIX: &str = "whsec_";
/// Maximum accepted distance between the signed timestamp and the local clock.
pub const DEFAULT_TOLERANCE: Duration = Duration::minutes(5);
