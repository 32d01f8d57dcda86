//! Session identity
//!
//! Handles:
//! - Session cookie decoding (unverified, display only)
//! - Identity extractor

mod middleware;
pub mod session;

pub use middleware::{MaybeIdentity, identity_from_headers};
pub use session::{Identity, decode_identity};
