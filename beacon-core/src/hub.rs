use std::cell::RefCell;
use std::fmt;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};
use std::time::Duration;

use crate::protocol::{Breadcrumb, Event, Level};
use crate::types::Uuid;
use crate::{CaptureContext, Client, EventHint, Scope};

static PROCESS_HUB: LazyLock<Arc<Hub>> = LazyLock::new(|| Arc::new(Hub::new(None)));

thread_local! {
    static THREAD_HUB: RefCell<Option<Arc<Hub>>> = const { RefCell::new(None) };
}

/// The handle through which the free functions reach a client.
///
/// A hub binds at most one [`Client`].  Every thread uses the process wide
/// hub unless another hub was bound with [`Hub::run`], so tests and
/// embedders can construct isolated hubs at will.
///
/// Toplevel convenience functions are exposed that will automatically
/// dispatch to the current hub ([`Hub::current`]).
pub struct Hub {
    client: RwLock<Option<Arc<Client>>>,
    last_event_id: RwLock<Option<Uuid>>,
}

impl fmt::Debug for Hub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hub")
            .field("client", &self.client())
            .field("last_event_id", &self.last_event_id())
            .finish()
    }
}

struct RestoreHub(Option<Arc<Hub>>);

impl Drop for RestoreHub {
    fn drop(&mut self) {
        let previous = self.0.take();
        let _ = THREAD_HUB.try_with(|hub| *hub.borrow_mut() = previous);
    }
}

impl Hub {
    /// Creates a new hub bound to the given client.
    pub fn new(client: Option<Arc<Client>>) -> Hub {
        Hub {
            client: RwLock::new(client),
            last_event_id: RwLock::new(None),
        }
    }

    /// Returns the current hub.
    ///
    /// This is the hub bound with [`Hub::run`] on this thread, or the process
    /// wide hub.
    pub fn current() -> Arc<Hub> {
        THREAD_HUB
            .try_with(|hub| hub.borrow().clone())
            .ok()
            .flatten()
            .unwrap_or_else(Hub::main)
    }

    /// Returns the process wide hub.
    pub fn main() -> Arc<Hub> {
        PROCESS_HUB.clone()
    }

    /// Invokes the callback with the current hub.
    pub fn with<F, R>(f: F) -> R
    where
        F: FnOnce(&Hub) -> R,
    {
        let hub = Hub::current();
        f(&hub)
    }

    /// Binds the hub to the current thread for the duration of the callback.
    ///
    /// The previously bound hub is restored afterwards, even if the callback
    /// panics.
    pub fn run<F: FnOnce() -> R, R>(self: &Arc<Self>, f: F) -> R {
        let previous = THREAD_HUB
            .try_with(|hub| hub.borrow_mut().replace(self.clone()))
            .ok()
            .flatten();
        let _restore = RestoreHub(previous);
        f()
    }

    /// Returns the currently bound client.
    pub fn client(&self) -> Option<Arc<Client>> {
        self.client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Binds a new client to the hub.
    pub fn bind_client(&self, client: Option<Arc<Client>>) {
        *self.client.write().unwrap_or_else(PoisonError::into_inner) = client;
    }

    /// Returns the id of the last event captured through this hub.
    pub fn last_event_id(&self) -> Option<Uuid> {
        *self
            .last_event_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn remember(&self, event_id: Option<Uuid>) -> Option<Uuid> {
        if event_id.is_some() {
            *self
                .last_event_id
                .write()
                .unwrap_or_else(PoisonError::into_inner) = event_id;
        }
        event_id
    }

    /// Sends the event through the bound client.
    ///
    /// See the global [`capture_event`](crate::capture_event)
    /// for more documentation.
    pub async fn capture_event(
        &self,
        event: Event,
        hint: Option<EventHint>,
        context: Option<CaptureContext>,
    ) -> Option<Uuid> {
        let client = self.client()?;
        let event_id = client.capture_event(event, hint, context).await;
        self.remember(event_id)
    }

    /// Captures an arbitrary message.
    pub async fn capture_message(&self, msg: &str, level: Level) -> Option<Uuid> {
        let client = self.client()?;
        let event_id = client.capture_message(msg, level, None).await;
        self.remember(event_id)
    }

    /// Captures an error and its chain of sources.
    pub async fn capture_error(
        &self,
        error: Arc<dyn std::error::Error + Send + Sync>,
    ) -> Option<Uuid> {
        let client = self.client()?;
        let event_id = client.capture_exception(error, None).await;
        self.remember(event_id)
    }

    /// Adds a breadcrumb to the scope of the bound client.
    pub fn add_breadcrumb(&self, breadcrumb: Breadcrumb) {
        if let Some(client) = self.client() {
            client.add_breadcrumb(breadcrumb);
        }
    }

    /// Invokes a function that can modify the scope of the bound client.
    ///
    /// Returns the default value of `R` if no client is bound.
    pub fn configure_scope<F, R>(&self, f: F) -> R
    where
        R: Default,
        F: FnOnce(&mut Scope) -> R,
    {
        match self.client() {
            Some(client) => client.configure_scope(f),
            None => Default::default(),
        }
    }

    /// Waits for the bound client's transport to settle.
    ///
    /// Returns `true` if no client is bound.
    pub async fn flush(&self, timeout: Option<Duration>) -> bool {
        match self.client() {
            Some(client) => client.flush(timeout).await,
            None => true,
        }
    }
}
