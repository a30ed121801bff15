//! Utility types for xcashu.
//!
//! - [`b64`] - Base64url encoding/decoding of token envelopes

pub mod b64;

pub use b64::*;
