//! This crate provides support for capturing events and errors and
//! delivering them to a beacon ingest endpoint.
//!
//! # Quickstart
//!
//! The most convenient way to use this library is the [`beacon::init`]
//! function, which starts a client with the default HTTP transport and binds
//! it to the current [`Hub`].
//!
//! The [`beacon::init`] function returns a guard.  Keep the guard around or
//! sending events will not work, and close it to wait for pending requests
//! before the application exits.
//!
//! ```
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let guard = beacon::init("https://key@ingest.example.com/42");
//! beacon::capture_message("Hello World!", beacon::Level::Info).await;
//! // wait up to two seconds for the message to be delivered
//! guard.close(None).await;
//! # }
//! ```
//!
//! [`beacon::init`]: fn.init.html
//! [`Hub`]: struct.Hub.html
//!
//! # Delivery
//!
//! Every request first passes the rate limits the server reported for its
//! category, then a bounded buffer of in-flight requests.  Requests that
//! fail either check are rejected right away and never retried.  See
//! [`transports`] for the building blocks.
//!
//! # Minimal API
//!
//! This crate comes fully featured.  If the goal is to instrument libraries,
//! or to extend beacon with a custom [`Integration`] or a [`Transport`], one
//! should use the [`beacon-core`] crate instead.
//!
//! [`Integration`]: trait.Integration.html
//! [`Transport`]: trait.Transport.html
//! [`beacon-core`]: https://crates.io/crates/beacon-core
//!
//! # Features
//!
//! Default features:
//!
//! * `transport`: Enables the default transport, which is currently `reqwest`
//!   with `native-tls`.
//!
//! Additional features:
//!
//! * `test`: Enables testing support.
//! * `debug-logs`: Uses the `log` crate for internal logging.
//! * `reqwest`: Enables the `reqwest` transport.
//! * `native-tls`: Uses the platform TLS implementation in `reqwest`.
//! * `rustls`: Enables the `rustls` support of the `reqwest` transport.

#![warn(missing_docs)]

mod init;
pub mod transports;

// re-export from core
#[doc(inline)]
pub use beacon_core::*;

// added public API
pub use crate::init::{init, ClientInitGuard};
