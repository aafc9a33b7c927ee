use std::sync::Arc;
use std::time::Duration;

use beacon_core::beacon_debug;

use crate::transports::DefaultTransportFactory;
use crate::{Client, ClientOptions, Hub};

/// Helper struct that is returned from `init`.
///
/// When this is dropped without being closed the client is disabled.
/// Pending requests are not awaited, use [`ClientInitGuard::close`] for that.
#[must_use = "when the init guard is dropped the client is disabled and no further \
              events can be sent.  If you do want to ignore this use mem::forget on it."]
pub struct ClientInitGuard(Arc<Client>);

impl ClientInitGuard {
    /// Quick check if the client is enabled.
    pub fn is_enabled(&self) -> bool {
        self.0.is_enabled()
    }

    /// The client created by [`init`].
    pub fn client(&self) -> Arc<Client> {
        self.0.clone()
    }

    /// Waits for pending requests and then permanently disables the client.
    ///
    /// Falls back to `shutdown_timeout` if no timeout is given.  Returns
    /// `true` if everything was delivered in time.
    pub async fn close(&self, timeout: Option<Duration>) -> bool {
        self.0.close(timeout).await
    }
}

impl Drop for ClientInitGuard {
    fn drop(&mut self) {
        if self.is_enabled() {
            beacon_debug!("dropping client guard -> disabling client");
        } else {
            beacon_debug!("dropping client guard (no client to dispose)");
        }
        self.0.disable();
    }
}

/// Creates the beacon client for a given client config and binds it.
///
/// This returns a client init guard that must kept in scope.  When the guard
/// is dropped the client is disabled and no further events are captured.
///
/// If the options carry no transport the [`DefaultTransportFactory`] is
/// used.
///
/// # Examples
///
/// ```
/// let _beacon = beacon::init("https://key@ingest.example.com/1234");
/// ```
///
/// The guard returned can also be inspected to see if a client has been
/// created to enable further configuration:
///
/// ```
/// let beacon = beacon::init(beacon::ClientOptions {
///     release: Some("foo-bar-baz@1.0.0".into()),
///     ..Default::default()
/// });
/// if !beacon.is_enabled() {
///     // no DSN was configured
/// }
/// ```
///
/// This binds the client to the hub that is current on the calling thread,
/// which is the process wide hub unless [`Hub::run`] bound another one.
pub fn init<C: Into<ClientOptions>>(cfg: C) -> ClientInitGuard {
    let mut options = cfg.into();
    if options.transport.is_none() {
        options.transport = Some(Arc::new(DefaultTransportFactory));
    }

    let client = Arc::new(Client::from(options));
    Hub::with(|hub| hub.bind_client(Some(client.clone())));
    if let Some(dsn) = client.dsn() {
        beacon_debug!("enabled beacon client for DSN {}", dsn);
    } else {
        beacon_debug!("initialized disabled beacon client due to disabled or invalid DSN");
    }
    ClientInitGuard(client)
}
