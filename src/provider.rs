//! Identity provider descriptors (data) and error classification strategies (behavior).
//!
//! `descriptor` holds validated endpoint metadata and the client authentication mode used
//! for the token endpoint. `strategy` defines [`ProviderStrategy`], the HTTP-client-agnostic
//! hook that sorts token endpoint failures into "restart authorization" versus "retry later".

pub mod descriptor;
pub mod strategy;

pub use descriptor::*;
pub use strategy::*;
