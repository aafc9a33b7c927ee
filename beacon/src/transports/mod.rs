//! The provided transports.
//!
//! [`BaseTransport`] carries the delivery policy shared by every network
//! transport: per category rate limits and a bounded buffer of in-flight
//! requests.  The `reqwest` feature turns on the [`ReqwestHttpTransport`],
//! which is what [`DefaultTransportFactory`] creates.

use std::sync::Arc;

use crate::{ClientOptions, NoopTransport, Transport, TransportFactory};

mod async_buffer;
mod base;
mod ratelimit;

#[cfg(feature = "reqwest")]
mod reqwest;

pub use self::async_buffer::AsyncBuffer;
pub use self::base::{BaseTransport, HttpResponse, RequestMaker};
pub use self::ratelimit::{RateLimiter, ALL_CATEGORIES};

#[cfg(feature = "reqwest")]
pub use self::reqwest::{AuthMode, ReqwestHttpTransport};

/// The default http transport.
#[cfg(feature = "reqwest")]
pub type HttpTransport = ReqwestHttpTransport;

/// Creates the default HTTP transport.
///
/// This is the value [`init`](crate::init) puts into `transport` on the
/// client options when none is set.  Options without a DSN, a library
/// compiled without an http transport, or an HTTP client that fails to build
/// get a [`NoopTransport`].
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultTransportFactory;

impl TransportFactory for DefaultTransportFactory {
    fn create_transport(&self, options: &ClientOptions) -> Arc<dyn Transport> {
        let Some(dsn) = options.dsn.as_ref() else {
            return Arc::new(NoopTransport);
        };

        #[cfg(feature = "reqwest")]
        {
            transport_or_noop(HttpTransport::new(dsn, options))
        }
        #[cfg(not(feature = "reqwest"))]
        {
            crate::beacon_debug!(
                "[Transport] No http transport compiled in, dropping events for {}",
                dsn
            );
            Arc::new(NoopTransport)
        }
    }
}

#[cfg_attr(not(feature = "reqwest"), allow(dead_code))]
fn transport_or_noop<T, E>(transport: Result<T, E>) -> Arc<dyn Transport>
where
    T: Transport + 'static,
    E: std::fmt::Display,
{
    match transport {
        Ok(transport) => Arc::new(transport),
        Err(err) => {
            crate::beacon_debug!("[Transport] Could not create http transport: {}", err);
            Arc::new(NoopTransport)
        }
    }
}
