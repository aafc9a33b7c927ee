use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::constants::USER_AGENT;
use crate::protocol::{Breadcrumb, ClientSdkPackage, Event};
use crate::types::Dsn;
use crate::{BreadcrumbHint, EventHint, Integration, IntoDsn, TransportFactory};

/// The final filter an event passes before it is handed to the transport.
///
/// Returning `None` drops the event.
pub type BeforeSendCallback = Arc<dyn Fn(Event, &EventHint) -> Option<Event> + Send + Sync>;

/// Callback that is executed for each breadcrumb being added to a scope.
pub type BeforeBreadcrumbCallback =
    Arc<dyn Fn(Breadcrumb, &BreadcrumbHint) -> Option<Breadcrumb> + Send + Sync>;

/// Configuration settings for the client.
///
/// # Examples
///
/// ```
/// let _options = beacon_core::ClientOptions {
///     debug: true,
///     ..Default::default()
/// };
/// ```
#[derive(Clone)]
pub struct ClientOptions {
    // Common options
    /// The DSN to use.  If not set the client is effectively disabled.
    pub dsn: Option<Dsn>,
    /// Enables debug mode.
    ///
    /// In debug mode debug information is printed to stderr to help you
    /// understand what the pipeline is doing.  With the `debug-logs` feature
    /// output goes to the `beacon` logger instead, independently of this flag.
    pub debug: bool,
    /// The release to be sent with events.
    pub release: Option<Cow<'static, str>>,
    /// The distribution of the release.
    pub dist: Option<Cow<'static, str>>,
    /// The environment to be sent with events.
    ///
    /// Events are reported as `"production"` if this is not set.
    pub environment: Option<Cow<'static, str>>,
    /// The server name to be reported.
    pub server_name: Option<Cow<'static, str>>,
    /// The sample rate for event submission. (0.0 - 1.0, defaults to 1.0)
    pub sample_rate: f32,
    /// Maximum number of breadcrumbs. (defaults to 100, capped at 100)
    pub max_breadcrumbs: usize,
    /// Maximum length of the message, the first exception value and the
    /// request url.  `0` disables truncation. (defaults to 250)
    pub max_value_length: usize,
    /// Depth to which free-form event data is normalized.  `0` disables
    /// normalization. (defaults to 3)
    pub normalize_depth: usize,
    // Hooks
    /// Callback that is executed before event sending.
    pub before_send: Option<BeforeSendCallback>,
    /// Callback that is executed for each breadcrumb being added.
    pub before_breadcrumb: Option<BeforeBreadcrumbCallback>,
    // Integration options
    /// A list of integrations to enable.
    pub integrations: Vec<Arc<dyn Integration>>,
    // Transport options
    /// The transport to use.
    ///
    /// This is typically either a boxed function taking the client options by
    /// reference and returning a `Transport`, a boxed `Arc<Transport>` or
    /// alternatively the `DefaultTransportFactory` of the `beacon` crate.
    pub transport: Option<Arc<dyn TransportFactory>>,
    /// The maximum number of requests a transport keeps in flight. (defaults to 30)
    pub buffer_size: usize,
    /// An optional HTTP proxy to use.
    pub http_proxy: Option<Cow<'static, str>>,
    /// An optional HTTPS proxy to use.
    pub https_proxy: Option<Cow<'static, str>>,
    /// The timeout on client drop for draining events on shutdown.
    pub shutdown_timeout: Duration,
    // Other options
    /// User agent reported by transports.
    pub user_agent: Cow<'static, str>,
    /// Turns capturing on or off without removing the DSN.
    pub enabled: bool,
    /// Additional packages reported in the SDK metadata of every event.
    pub sdk_packages: Vec<ClientSdkPackage>,
}

impl ClientOptions {
    /// Creates new Options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a configured integration to the options.
    ///
    /// # Examples
    ///
    /// ```
    /// struct MyIntegration;
    ///
    /// impl beacon_core::Integration for MyIntegration {
    ///     fn name(&self) -> &'static str {
    ///         "my-integration"
    ///     }
    /// }
    ///
    /// let options = beacon_core::ClientOptions::new().add_integration(MyIntegration);
    /// assert_eq!(options.integrations[0].name(), "my-integration");
    /// ```
    #[must_use]
    pub fn add_integration<I: Integration>(mut self, integration: I) -> Self {
        self.integrations.push(Arc::new(integration));
        self
    }

    /// Sets the `before_send` callback.
    #[must_use]
    pub fn before_send<F>(mut self, f: F) -> Self
    where
        F: Fn(Event, &EventHint) -> Option<Event> + Send + Sync + 'static,
    {
        self.before_send = Some(Arc::new(f));
        self
    }

    /// Sets the `before_breadcrumb` callback.
    #[must_use]
    pub fn before_breadcrumb<F>(mut self, f: F) -> Self
    where
        F: Fn(Breadcrumb, &BreadcrumbHint) -> Option<Breadcrumb> + Send + Sync + 'static,
    {
        self.before_breadcrumb = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        #[derive(Debug)]
        struct BeforeSend;
        let before_send = self.before_send.as_ref().map(|_| BeforeSend);
        #[derive(Debug)]
        struct BeforeBreadcrumb;
        let before_breadcrumb = self.before_breadcrumb.as_ref().map(|_| BeforeBreadcrumb);
        #[derive(Debug)]
        struct TransportFactory;

        let integrations: Vec<_> = self.integrations.iter().map(|i| i.name()).collect();

        f.debug_struct("ClientOptions")
            .field("dsn", &self.dsn)
            .field("debug", &self.debug)
            .field("release", &self.release)
            .field("dist", &self.dist)
            .field("environment", &self.environment)
            .field("server_name", &self.server_name)
            .field("sample_rate", &self.sample_rate)
            .field("max_breadcrumbs", &self.max_breadcrumbs)
            .field("max_value_length", &self.max_value_length)
            .field("normalize_depth", &self.normalize_depth)
            .field("before_send", &before_send)
            .field("before_breadcrumb", &before_breadcrumb)
            .field("integrations", &integrations)
            .field("transport", &self.transport.as_ref().map(|_| TransportFactory))
            .field("buffer_size", &self.buffer_size)
            .field("http_proxy", &self.http_proxy)
            .field("https_proxy", &self.https_proxy)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("user_agent", &self.user_agent)
            .field("enabled", &self.enabled)
            .field("sdk_packages", &self.sdk_packages)
            .finish()
    }
}

impl Default for ClientOptions {
    fn default() -> ClientOptions {
        ClientOptions {
            dsn: None,
            debug: false,
            release: None,
            dist: None,
            environment: None,
            server_name: None,
            sample_rate: 1.0,
            max_breadcrumbs: 100,
            max_value_length: 250,
            normalize_depth: 3,
            before_send: None,
            before_breadcrumb: None,
            integrations: vec![],
            transport: None,
            buffer_size: 30,
            http_proxy: None,
            https_proxy: None,
            shutdown_timeout: Duration::from_secs(2),
            user_agent: Cow::Owned(USER_AGENT.clone()),
            enabled: true,
            sdk_packages: vec![],
        }
    }
}

impl<T: IntoDsn> From<(T, ClientOptions)> for ClientOptions {
    fn from((into_dsn, mut opts): (T, ClientOptions)) -> ClientOptions {
        opts.dsn = into_dsn.into_dsn().expect("invalid value for DSN");
        opts
    }
}

impl<T: IntoDsn> From<T> for ClientOptions {
    fn from(into_dsn: T) -> ClientOptions {
        ClientOptions {
            dsn: into_dsn.into_dsn().expect("invalid value for DSN"),
            ..ClientOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ClientOptions::default();
        assert!(options.enabled);
        assert_eq!(options.sample_rate, 1.0);
        assert_eq!(options.max_value_length, 250);
        assert_eq!(options.normalize_depth, 3);
        assert_eq!(options.buffer_size, 30);
        assert!(options.user_agent.starts_with("beacon.rust/"));
    }

    #[test]
    fn test_from_dsn_tuple() {
        let options: ClientOptions = (
            "https://abc@ingest.example.com/123",
            ClientOptions {
                debug: true,
                ..Default::default()
            },
        )
            .into();
        assert!(options.debug);
        assert_eq!(options.dsn.unwrap().project_id().as_str(), "123");
    }

    #[test]
    #[should_panic(expected = "invalid value for DSN")]
    fn test_from_invalid_dsn() {
        let _options: ClientOptions = "https://@ingest.example.com/123".into();
    }
}
