use std::time::Duration;

use futures::future::{self, BoxFuture};
use futures::FutureExt;
use reqwest::{header as ReqwestHeaders, Client as ReqwestClient, Error as ReqwestError, Proxy};

use super::base::{BaseTransport, HttpResponse, RequestMaker};
use crate::types::Dsn;
use crate::{
    beacon_debug, ClientOptions, Transport, TransportError, TransportRequest, TransportResponse,
};

/// Where the [`ReqwestHttpTransport`] puts the credentials.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AuthMode {
    /// Sends an `X-Sentry-Auth` header.
    #[default]
    Header,
    /// Adds `sentry_key` and `sentry_version` to the endpoint URL.
    QueryString,
}

/// A [`Transport`] that sends envelopes via the [`reqwest`] library.
///
/// When the `transport` feature is enabled this will currently
/// be the default transport.  This is separately enabled by the
/// `reqwest` feature flag.
///
/// Requests are spawned onto the current tokio runtime.
///
/// [`reqwest`]: https://crates.io/crates/reqwest
#[cfg_attr(doc_cfg, doc(cfg(feature = "reqwest")))]
pub struct ReqwestHttpTransport {
    inner: BaseTransport<ReqwestRequestMaker>,
}

#[cfg_attr(doc_cfg, doc(cfg(feature = "reqwest")))]
impl ReqwestHttpTransport {
    /// Creates a new Transport sending to `dsn` with an auth header.
    ///
    /// Fails if the HTTP client cannot be set up, for instance when the TLS
    /// backend does not initialize.
    pub fn new(dsn: &Dsn, options: &ClientOptions) -> Result<Self, ReqwestError> {
        let client = build_client(options)?;
        Ok(Self::with_client(dsn, options, client, AuthMode::Header))
    }

    /// Creates a new Transport that uses the specified [`ReqwestClient`].
    pub fn with_client(
        dsn: &Dsn,
        options: &ClientOptions,
        client: ReqwestClient,
        auth_mode: AuthMode,
    ) -> Self {
        let maker = ReqwestRequestMaker::new(client, dsn, &options.user_agent, auth_mode);
        ReqwestHttpTransport {
            inner: BaseTransport::new(maker, options.buffer_size),
        }
    }
}

#[cfg_attr(doc_cfg, doc(cfg(feature = "reqwest")))]
impl Transport for ReqwestHttpTransport {
    fn send_request(
        &self,
        request: TransportRequest,
    ) -> BoxFuture<'static, Result<TransportResponse, TransportError>> {
        self.inner.send_request(request)
    }

    fn flush(&self, timeout: Duration) -> BoxFuture<'static, bool> {
        self.inner.flush(timeout)
    }
}

fn build_client(options: &ClientOptions) -> Result<ReqwestClient, ReqwestError> {
    let mut builder = ReqwestClient::builder();
    if let Some(url) = options.http_proxy.as_ref() {
        match Proxy::http(url.as_ref()) {
            Ok(proxy) => builder = builder.proxy(proxy),
            Err(err) => {
                beacon_debug!("[Transport] Ignoring invalid http proxy: {}", err);
            }
        }
    }
    if let Some(url) = options.https_proxy.as_ref() {
        match Proxy::https(url.as_ref()) {
            Ok(proxy) => builder = builder.proxy(proxy),
            Err(err) => {
                beacon_debug!("[Transport] Ignoring invalid https proxy: {}", err);
            }
        }
    }
    builder.build()
}

struct ReqwestRequestMaker {
    client: ReqwestClient,
    url: String,
    auth: Option<String>,
}

impl ReqwestRequestMaker {
    fn new(client: ReqwestClient, dsn: &Dsn, user_agent: &str, auth_mode: AuthMode) -> Self {
        let (url, auth) = match auth_mode {
            AuthMode::Header => (
                dsn.envelope_api_url(),
                Some(dsn.to_auth(Some(user_agent)).to_string()),
            ),
            AuthMode::QueryString => (dsn.envelope_url_with_auth(Some(user_agent)), None),
        };
        ReqwestRequestMaker { client, url, auth }
    }
}

impl RequestMaker for ReqwestRequestMaker {
    fn make_request(
        &self,
        request: TransportRequest,
    ) -> BoxFuture<'static, Result<HttpResponse, TransportError>> {
        let body = match request.body() {
            Ok(body) => body,
            Err(err) => return future::ready(Err(err)).boxed(),
        };
        let mut builder = self.client.post(&self.url).body(body);
        if let Some(auth) = self.auth.as_ref() {
            builder = builder.header("X-Sentry-Auth", auth);
        }

        // NOTE: the request is built outside of the async block so the
        // future does not borrow `self`.
        async move {
            let response = builder.send().await.map_err(|err| {
                beacon_debug!("[Transport] Failed to send envelope: {}", err);
                TransportError::NetworkFailure {
                    reason: err.to_string(),
                }
            })?;

            let header = |name: &str| {
                response
                    .headers()
                    .get(name)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_owned)
            };
            let rate_limits = header("x-sentry-rate-limits");
            let retry_after = header(ReqwestHeaders::RETRY_AFTER.as_str());
            let status = response.status();

            let body = match response.text().await {
                Ok(text) => {
                    beacon_debug!("[Transport] Got response: `{}`", text);
                    Some(text)
                }
                Err(err) => {
                    beacon_debug!("[Transport] Failed to read response: {}", err);
                    None
                }
            };

            Ok(HttpResponse {
                status_code: status.as_u16(),
                rate_limits,
                retry_after,
                body,
                reason: status.canonical_reason().map(str::to_owned),
            })
        }
        .boxed()
    }
}
