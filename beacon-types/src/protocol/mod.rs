//! This module exposes the types for the event protocol.

pub mod envelope;
pub mod session;
pub mod v7;

/// The latest version of the protocol.
pub const LATEST: u16 = 7;

/// The always latest protocol version.
pub mod latest {
    pub use super::v7::*;
}
