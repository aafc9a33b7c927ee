use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use futures::future::{self, BoxFuture};
use futures::FutureExt;

use super::async_buffer::AsyncBuffer;
use super::ratelimit::RateLimiter;
use crate::{
    beacon_debug, ResponseStatus, Transport, TransportError, TransportRequest, TransportResponse,
};

const FALLBACK_REASON: &str = "Unknown transport error";

/// The raw outcome of a single network call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HttpResponse {
    /// The HTTP status code.
    pub status_code: u16,
    /// The `X-Sentry-Rate-Limits` header.
    pub rate_limits: Option<String>,
    /// The `Retry-After` header.
    pub retry_after: Option<String>,
    /// The response body.
    pub body: Option<String>,
    /// The status reason phrase.
    pub reason: Option<String>,
}

impl HttpResponse {
    /// Creates a response with the given status code and nothing else.
    pub fn with_status(status_code: u16) -> HttpResponse {
        HttpResponse {
            status_code,
            ..Default::default()
        }
    }
}

/// Performs the actual network call for a [`BaseTransport`].
///
/// The returned future is only polled once the transport's buffer admitted
/// the request.  Failing to reach the server at all is reported as
/// [`TransportError::NetworkFailure`].
///
/// This is automatically implemented for closures returning a boxed future.
pub trait RequestMaker: Send + Sync + 'static {
    /// Sends the request.
    fn make_request(
        &self,
        request: TransportRequest,
    ) -> BoxFuture<'static, Result<HttpResponse, TransportError>>;
}

impl<F> RequestMaker for F
where
    F: Fn(TransportRequest) -> BoxFuture<'static, Result<HttpResponse, TransportError>>
        + Send
        + Sync
        + 'static,
{
    fn make_request(
        &self,
        request: TransportRequest,
    ) -> BoxFuture<'static, Result<HttpResponse, TransportError>> {
        self(request)
    }
}

/// A transport that enforces rate limits and bounds the number of requests
/// in flight.
///
/// Requests for a rate limited category fail right away.  Everything else
/// goes through an [`AsyncBuffer`] and is handed to the [`RequestMaker`] once
/// admitted.  The rate limits are updated from the headers of every
/// response.
pub struct BaseTransport<M> {
    maker: Arc<M>,
    rate_limits: Arc<Mutex<RateLimiter>>,
    buffer: AsyncBuffer,
}

impl<M: RequestMaker> BaseTransport<M> {
    /// Creates a transport admitting at most `buffer_size` requests at once.
    pub fn new(maker: M, buffer_size: usize) -> Self {
        BaseTransport {
            maker: Arc::new(maker),
            rate_limits: Default::default(),
            buffer: AsyncBuffer::new(buffer_size),
        }
    }

    /// Returns a snapshot of the current rate limits.
    pub fn rate_limits(&self) -> RateLimiter {
        self.rate_limits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The buffer of in-flight requests.
    pub fn buffer(&self) -> &AsyncBuffer {
        &self.buffer
    }
}

impl<M: RequestMaker> Transport for BaseTransport<M> {
    fn send_request(
        &self,
        request: TransportRequest,
    ) -> BoxFuture<'static, Result<TransportResponse, TransportError>> {
        let disabled = self
            .rate_limits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_disabled(&request.category, SystemTime::now());
        if let Some(retry_at) = disabled {
            beacon_debug!(
                "[Transport] Transport for `{}` locked till {:?} due to too many requests",
                request.category,
                retry_at
            );
            return future::ready(Err(TransportError::RateLimited {
                category: request.category,
                retry_at,
            }))
            .boxed();
        }

        let maker = self.maker.clone();
        let rate_limits = self.rate_limits.clone();
        self.buffer.add(async move {
            let response = maker.make_request(request).await?;
            update_rate_limits(&rate_limits, &response);

            let status = ResponseStatus::from_status_code(response.status_code);
            if status == ResponseStatus::Success {
                return Ok(TransportResponse {
                    status,
                    reason: None,
                });
            }

            let reason = response
                .body
                .filter(|body| !body.is_empty())
                .or(response.reason)
                .unwrap_or_else(|| FALLBACK_REASON.into());
            beacon_debug!(
                "[Transport] Request failed with status {:?}: {}",
                status,
                reason
            );
            Err(TransportError::NetworkFailure { reason })
        })
    }

    fn flush(&self, timeout: Duration) -> BoxFuture<'static, bool> {
        let buffer = self.buffer.clone();
        async move { buffer.drain(timeout).await }.boxed()
    }
}

fn update_rate_limits(rate_limits: &Mutex<RateLimiter>, response: &HttpResponse) {
    let now = SystemTime::now();
    let mut rate_limits = rate_limits.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(header) = response.rate_limits.as_deref() {
        rate_limits.update_from_rate_limits_header(header, now);
    } else if let Some(header) = response.retry_after.as_deref() {
        rate_limits.update_from_retry_after(header, now);
    }
}
