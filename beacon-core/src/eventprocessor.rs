use std::error::Error;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::protocol::{Event, Map, Value};
use crate::Uuid;

/// Out-of-band data passed alongside an event through the pipeline.
///
/// The hint is never serialized.  Processors and `before_send` can use it to
/// inspect the original error an event was built from.
#[derive(Clone, Debug, Default)]
pub struct EventHint {
    /// An event id to use if the event does not carry one yet.
    pub event_id: Option<Uuid>,
    /// The error the event was created from.
    pub original_exception: Option<Arc<dyn Error + Send + Sync>>,
    /// Marks a capture issued by the pipeline itself after an internal fault.
    ///
    /// Such events skip `before_send`.
    pub internal: bool,
    /// Arbitrary additional data.
    pub data: Map<String, Value>,
}

impl EventHint {
    /// Creates a hint carrying the error the event was built from.
    pub fn from_exception(exception: Arc<dyn Error + Send + Sync>) -> EventHint {
        EventHint {
            original_exception: Some(exception),
            ..Default::default()
        }
    }
}

/// The result of a single [`EventProcessor`] invocation.
///
/// Processors either answer right away or hand back a future.  `None` drops
/// the event and stops the chain.
pub enum Outcome {
    /// The processor finished synchronously.
    Ready(Option<Event>),
    /// The processor needs to await something before it can decide.
    Pending(BoxFuture<'static, Option<Event>>),
}

impl Outcome {
    /// Keeps the (possibly modified) event.
    pub fn keep(event: Event) -> Outcome {
        Outcome::Ready(Some(event))
    }

    /// Drops the event.
    pub fn discard() -> Outcome {
        Outcome::Ready(None)
    }

    /// Wraps a future that resolves to the processed event.
    pub fn pending<F>(future: F) -> Outcome
    where
        F: Future<Output = Option<Event>> + Send + 'static,
    {
        Outcome::Pending(future.boxed())
    }

    /// Waits for the processor to settle.
    pub async fn resolve(self) -> Option<Event> {
        match self {
            Outcome::Ready(event) => event,
            Outcome::Pending(future) => future.await,
        }
    }
}

impl From<Option<Event>> for Outcome {
    fn from(event: Option<Event>) -> Self {
        Outcome::Ready(event)
    }
}

impl From<Event> for Outcome {
    fn from(event: Event) -> Self {
        Outcome::Ready(Some(event))
    }
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Ready(event) => f.debug_tuple("Ready").field(event).finish(),
            Outcome::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

/// A generic Event Processor
///
/// The Event Processor is invoked during different stages of the pipeline.
/// It can add more information to an event, modify existing information, or
/// decide to discard the event altogether, in which case further processing and
/// uploading is skipped.
pub trait EventProcessor: Send + Sync {
    /// Processes an event.
    fn process_event(&self, event: Event, hint: &EventHint) -> Outcome;
}

impl<F> EventProcessor for F
where
    F: Fn(Event, &EventHint) -> Outcome + Send + Sync,
{
    fn process_event(&self, event: Event, hint: &EventHint) -> Outcome {
        self(event, hint)
    }
}

static GLOBAL_EVENT_PROCESSORS: LazyLock<RwLock<Vec<Arc<dyn EventProcessor>>>> =
    LazyLock::new(Default::default);

/// Registers a processor that runs for every event of every client.
///
/// Global processors run before the scope and client level ones, in
/// registration order.
pub fn add_global_event_processor<F>(processor: F)
where
    F: Fn(Event, &EventHint) -> Outcome + Send + Sync + 'static,
{
    GLOBAL_EVENT_PROCESSORS
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .push(Arc::new(processor));
    beacon_debug!("[Scope] Added global event processor");
}

/// Returns a snapshot of the registered global processors.
pub fn global_event_processors() -> Vec<Arc<dyn EventProcessor>> {
    GLOBAL_EVENT_PROCESSORS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Removes all global processors.
pub fn clear_global_event_processors() {
    GLOBAL_EVENT_PROCESSORS
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .clear();
}

/// Folds `event` through `processors` in order.
///
/// Returns the index of the processor that dropped the event, if any; later
/// processors are not invoked.
pub(crate) async fn notify_event_processors(
    processors: &[Arc<dyn EventProcessor>],
    mut event: Event,
    hint: &EventHint,
) -> Result<Event, usize> {
    for (index, processor) in processors.iter().enumerate() {
        match processor.process_event(event, hint).resolve().await {
            Some(processed) => event = processed,
            None => return Err(index),
        }
    }
    Ok(event)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    #[tokio::test]
    async fn test_short_circuit() {
        let called = Arc::new(AtomicBool::new(false));
        let called_clone = called.clone();

        let processors: Vec<Arc<dyn EventProcessor>> = vec![
            Arc::new(|event: Event, _: &EventHint| Outcome::keep(event)),
            Arc::new(|_: Event, _: &EventHint| Outcome::discard()),
            Arc::new(move |event: Event, _: &EventHint| {
                called_clone.store(true, Ordering::SeqCst);
                Outcome::keep(event)
            }),
        ];

        let result = notify_event_processors(&processors, Event::new(), &EventHint::default()).await;
        assert_eq!(result.err(), Some(1));
        assert!(!called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_pending_processors_are_chained() {
        let processors: Vec<Arc<dyn EventProcessor>> = vec![
            Arc::new(|mut event: Event, _: &EventHint| {
                Outcome::pending(async move {
                    tokio::task::yield_now().await;
                    event.tags.insert("first".into(), "1".into());
                    Some(event)
                })
            }),
            Arc::new(|mut event: Event, _: &EventHint| {
                assert_eq!(event.tags.get("first").map(String::as_str), Some("1"));
                event.tags.insert("second".into(), "2".into());
                Outcome::keep(event)
            }),
        ];

        let event = notify_event_processors(&processors, Event::new(), &EventHint::default())
            .await
            .unwrap();
        assert_eq!(event.tags.len(), 2);
    }
}
