use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use crate::protocol::{Breadcrumb, Event, Level};
use crate::types::Uuid;
use crate::{CaptureContext, EventHint, Hub, Scope};

/// Captures an event on the currently active client if any.
///
/// The event must already be assembled.  Typically code would instead use
/// the utility functions like [`capture_error`].  The return value is the
/// event id, or `None` if no client is bound or the pipeline dropped the
/// event.
///
/// The current hub is resolved when the returned future is first polled.
///
/// # Example
///
/// ```
/// use beacon_core::protocol::{Event, Level};
///
/// # futures::executor::block_on(async {
/// beacon_core::capture_event(
///     Event {
///         message: Some("Hello World!".into()),
///         level: Some(Level::Info),
///         ..Default::default()
///     },
///     None,
///     None,
/// )
/// .await;
/// # });
/// ```
pub async fn capture_event(
    event: Event,
    hint: Option<EventHint>,
    context: Option<CaptureContext>,
) -> Option<Uuid> {
    Hub::current().capture_event(event, hint, context).await
}

/// Captures an arbitrary message.
///
/// This creates an event from the given message and sends it to the current hub.
pub async fn capture_message(msg: &str, level: Level) -> Option<Uuid> {
    Hub::current().capture_message(msg, level).await
}

/// Captures an error, including its chain of sources.
pub async fn capture_error(error: Arc<dyn Error + Send + Sync>) -> Option<Uuid> {
    Hub::current().capture_error(error).await
}

/// Records a breadcrumb on the scope of the current client.
///
/// The total number of breadcrumbs that can be recorded are limited by the
/// configuration on the client.
///
/// # Example
///
/// ```
/// use beacon_core::protocol::{Breadcrumb, Map};
///
/// beacon_core::add_breadcrumb(Breadcrumb {
///     ty: "http".into(),
///     category: Some("request".into()),
///     data: {
///         let mut map = Map::new();
///         map.insert("method".into(), "GET".into());
///         map.insert("url".into(), "https://example.com/".into());
///         map
///     },
///     ..Default::default()
/// });
/// ```
pub fn add_breadcrumb(breadcrumb: Breadcrumb) {
    Hub::with(|hub| hub.add_breadcrumb(breadcrumb))
}

/// Invokes a function that can modify the current scope.
///
/// The function is passed a mutable reference to the `Scope` so that modifications
/// can be performed.  Because there might currently not be a client active
/// it's possible that the callback might not be called at all.  As a result of this
/// the return value of this closure must have a default that is returned in such
/// cases.
///
/// # Example
///
/// ```
/// beacon_core::configure_scope(|scope| {
///     scope.set_user(Some(beacon_core::User {
///         username: Some("john_doe".into()),
///         ..Default::default()
///     }));
/// });
/// ```
///
/// # Panics
///
/// The scope is locked while the callback runs.  Capturing or configuring the
/// scope again from within the callback deadlocks or panics.
pub fn configure_scope<F, R>(f: F) -> R
where
    R: Default,
    F: FnOnce(&mut Scope) -> R,
{
    Hub::with(|hub| hub.configure_scope(f))
}

/// Returns the last event ID captured through the current hub.
pub fn last_event_id() -> Option<Uuid> {
    Hub::with(|hub| hub.last_event_id())
}

/// Waits for the current client's transport to deliver pending requests.
pub async fn flush(timeout: Option<Duration>) -> bool {
    Hub::current().flush(timeout).await
}
