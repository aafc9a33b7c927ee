//! This crate provides common types for working with the beacon event
//! protocol.
//!
//! It contains the DSN connection-string type used to address an ingest
//! endpoint, the auth header helper, and the `protocol` module with the
//! event, breadcrumb, session and envelope payloads.
//!
//! # Example
//!
//! ```
//! use beacon_types::Dsn;
//!
//! let dsn: Dsn = "https://abc@ingest.example.com/42".parse().unwrap();
//! assert_eq!(dsn.public_key(), "abc");
//! assert_eq!(dsn.project_id().value(), Some(42));
//! ```

#![warn(missing_docs)]

#[macro_use]
mod macros;

mod auth;
mod dsn;
mod project_id;
pub mod protocol;
pub(crate) mod utils;

pub use crate::auth::*;
pub use crate::dsn::*;
pub use crate::project_id::*;

// Re-export external types and traits for convenience
pub use time::OffsetDateTime;
pub use uuid::Uuid;

/// Generates a random v4 uuid.
pub fn random_uuid() -> Uuid {
    Uuid::new_v4()
}
