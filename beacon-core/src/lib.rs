//! This crate provides the core of the beacon SDK: the [`Scope`], the event
//! capture pipeline inside the [`Client`] and the [`Transport`] contract the
//! pipeline hands prepared events to.
//!
//! `beacon-core` is meant for integration authors and for code that wants to
//! plug in its own transport.  Applications normally use the `beacon` crate,
//! which adds the buffered, rate limited HTTP transport and `init`.
//!
//! # Core Concepts
//!
//! Every capture goes through the same ordered pipeline: an id and timestamp
//! are assigned, static client options are applied, the [`Scope`] is merged
//! in, global, scope and client level [`EventProcessor`]s run, the payload is
//! normalized, `before_send` gets the final say and the result is handed to
//! the [`Transport`].  Any stage may drop the event; the capture then
//! resolves to `None` and the reason is logged.
//!
//! The [`Hub`] is a thread-local handle to the current [`Client`], used by
//! the free functions such as [`capture_message`] and [`configure_scope`].
//! Tests can construct isolated clients and hubs at will.
//!
//! # Features
//!
//! - `feature = "test"`: Activates the [`test`] module, which comes with a
//!   transport that records every request for inspection.
//! - `feature = "debug-logs"`: Uses the `log` crate for debug output, instead
//!   of printing to `stderr`.
//!
//! [`test`]: test/index.html

#![warn(missing_docs)]

// macros; these need to be first to be used by other modules
#[macro_use]
mod macros;

mod api;
mod client;
mod clientoptions;
mod constants;
mod error;
mod eventprocessor;
mod hub;
mod integration;
mod intodsn;
mod scope;
mod session;
mod transport;
pub mod utils;

// public api or exports from this crate
pub use crate::api::*;
pub use crate::client::Client;
pub use crate::clientoptions::{BeforeBreadcrumbCallback, BeforeSendCallback, ClientOptions};
pub use crate::constants::{SDK_INFO, USER_AGENT, VERSION};
pub use crate::error::{event_from_error, CaptureError, ProcessorTier};
pub use crate::eventprocessor::{
    add_global_event_processor, clear_global_event_processors, global_event_processors,
    EventHint, EventProcessor, Outcome,
};
pub use crate::hub::Hub;
pub use crate::integration::Integration;
pub use crate::intodsn::IntoDsn;
pub use crate::scope::{
    BreadcrumbHint, CaptureContext, Scope, ScopeContext, ScopeListener, Span, MAX_BREADCRUMBS,
};
pub use crate::session::Session;
pub use crate::transport::{
    NoopTransport, ResponseStatus, Transport, TransportError, TransportFactory, TransportRequest,
    TransportResponse,
};


// public api from other crates
#[cfg(feature = "debug-logs")]
#[doc(hidden)]
pub use log;
#[doc(inline)]
pub use beacon_types as types;
pub use beacon_types::protocol::v7 as protocol;
pub use beacon_types::protocol::v7::{Breadcrumb, Envelope, Event, Level, User};
pub use beacon_types::Uuid;
