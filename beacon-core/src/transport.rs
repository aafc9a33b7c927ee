use std::sync::Arc;
use std::time::{Duration, SystemTime};

use futures::future::{self, BoxFuture};
use futures::FutureExt;
use thiserror::Error;

use crate::{ClientOptions, Envelope};

/// A single envelope submission.
#[derive(Clone, Debug)]
pub struct TransportRequest {
    /// The rate limiting category of the payload.
    pub category: String,
    /// The envelope to deliver.
    pub envelope: Envelope,
}

impl TransportRequest {
    /// Creates a request whose category is derived from the envelope.
    pub fn new(envelope: Envelope) -> TransportRequest {
        TransportRequest {
            category: envelope.category().to_owned(),
            envelope,
        }
    }

    /// Serializes the envelope into the request body.
    ///
    /// A serialization failure is reported as a `NetworkFailure` so nothing
    /// partial is ever sent.
    pub fn body(&self) -> Result<Vec<u8>, TransportError> {
        self.envelope.to_vec().map_err(|err| {
            beacon_debug!("[Transport] Could not serialize envelope: {}", err);
            TransportError::NetworkFailure {
                reason: err.to_string(),
            }
        })
    }
}

/// Classification of an ingest response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResponseStatus {
    /// The status could not be classified.
    Unknown,
    /// Nothing was sent.
    Skipped,
    /// The payload was accepted.
    Success,
    /// The server asked the client to back off.
    RateLimit,
    /// The payload was rejected.
    Invalid,
    /// The server failed to process the payload.
    Failed,
}

impl ResponseStatus {
    /// Maps an HTTP status code onto a response status.
    ///
    /// # Examples
    ///
    /// ```
    /// use beacon_core::ResponseStatus;
    ///
    /// assert_eq!(ResponseStatus::from_status_code(200), ResponseStatus::Success);
    /// assert_eq!(ResponseStatus::from_status_code(429), ResponseStatus::RateLimit);
    /// assert_eq!(ResponseStatus::from_status_code(413), ResponseStatus::Invalid);
    /// assert_eq!(ResponseStatus::from_status_code(503), ResponseStatus::Failed);
    /// assert_eq!(ResponseStatus::from_status_code(302), ResponseStatus::Unknown);
    /// ```
    pub fn from_status_code(code: u16) -> ResponseStatus {
        match code {
            200..=299 => ResponseStatus::Success,
            429 => ResponseStatus::RateLimit,
            400..=499 => ResponseStatus::Invalid,
            500.. => ResponseStatus::Failed,
            _ => ResponseStatus::Unknown,
        }
    }
}

/// The settled result of a delivered request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportResponse {
    /// The classified status.
    pub status: ResponseStatus,
    /// A reason reported by the server, if any.
    pub reason: Option<String>,
}

impl TransportResponse {
    /// A response for a request that was intentionally not sent.
    pub fn skipped() -> TransportResponse {
        TransportResponse {
            status: ResponseStatus::Skipped,
            reason: None,
        }
    }
}

/// Failures surfaced by a transport.
///
/// None of them are retried automatically.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The category is disabled until `retry_at`.
    #[error("{category} is rate limited until {retry_at:?}")]
    RateLimited {
        /// The rate limited category.
        category: String,
        /// When requests of the category are accepted again.
        retry_at: SystemTime,
    },
    /// Too many requests are already in flight.
    #[error("transport buffer is full")]
    BufferFull,
    /// The request did not produce a successful response.
    #[error("network failure: {reason}")]
    NetworkFailure {
        /// The server provided reason or a fallback message.
        reason: String,
    },
}

/// The trait for transports.
///
/// A transport is responsible for sending events to the ingest endpoint.
/// Requests are admitted synchronously when `send_request` is called; the
/// returned future only reports the settlement, dropping it does not cancel
/// delivery.
pub trait Transport: Send + Sync + 'static {
    /// Sends an envelope.
    fn send_request(
        &self,
        request: TransportRequest,
    ) -> BoxFuture<'static, Result<TransportResponse, TransportError>>;

    /// Waits for all in-flight requests to settle.
    ///
    /// Resolves `true` if they settled within `timeout`.  Nothing is
    /// cancelled if the timeout elapses.
    fn flush(&self, timeout: Duration) -> BoxFuture<'static, bool> {
        let _timeout = timeout;
        future::ready(true).boxed()
    }
}

/// A factory creating transport instances.
///
/// Because options are potentially reused between different clients the
/// options do not actually contain a transport but a factory object that
/// can create transports instead.
///
/// The factory has a single method that creates a new arced transport.
/// Because transports can be wrapped in `Arc`s and those are clonable
/// any `Arc<Transport>` is also a valid transport factory.  This for
/// instance lets you put a `Arc<TestTransport>` directly into the options.
///
/// This is automatically implemented for all closures optionally taking
/// options and returning a boxed factory.
pub trait TransportFactory: Send + Sync {
    /// Given some options creates a transport.
    fn create_transport(&self, options: &ClientOptions) -> Arc<dyn Transport>;
}

impl<F> TransportFactory for F
where
    F: Fn(&ClientOptions) -> Arc<dyn Transport> + Clone + Send + Sync + 'static,
{
    fn create_transport(&self, options: &ClientOptions) -> Arc<dyn Transport> {
        (*self)(options)
    }
}

impl<T: Transport> Transport for Arc<T> {
    fn send_request(
        &self,
        request: TransportRequest,
    ) -> BoxFuture<'static, Result<TransportResponse, TransportError>> {
        (**self).send_request(request)
    }

    fn flush(&self, timeout: Duration) -> BoxFuture<'static, bool> {
        (**self).flush(timeout)
    }
}

impl<T: Transport> TransportFactory for Arc<T> {
    fn create_transport(&self, options: &ClientOptions) -> Arc<dyn Transport> {
        let _options = options;
        self.clone()
    }
}

/// A transport that drops everything.
///
/// Used by clients without a DSN or without a transport factory.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTransport;

impl Transport for NoopTransport {
    fn send_request(
        &self,
        _request: TransportRequest,
    ) -> BoxFuture<'static, Result<TransportResponse, TransportError>> {
        future::ready(Ok(TransportResponse::skipped())).boxed()
    }
}
