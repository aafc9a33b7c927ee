use std::any::{type_name, Any};
use std::sync::Arc;

use crate::protocol::Event;
use crate::{ClientOptions, EventHint, EventProcessor, Outcome};

/// Integration abstraction.
///
/// An Integration can extend the pipeline at two points: it can adjust the
/// [`ClientOptions`] when the client is created, and it runs as a client level
/// event processor for every captured event, before processors added through
/// [`Client::add_event_processor`](crate::Client::add_event_processor).
///
/// Integrations are identified by their name; only the first integration
/// of a given name is installed.
pub trait Integration: Sync + Send + Any + AsAny {
    /// Name of this integration.
    ///
    /// This will be added to the SDK information of every event.
    fn name(&self) -> &'static str {
        type_name::<Self>()
    }

    /// Called whenever the integration is attached to a Client.
    fn setup(&self, options: &mut ClientOptions) {
        let _ = options;
    }

    /// The Integrations Event Processor Hook.
    ///
    /// An integration can process, or even completely drop an `Event`.
    fn process_event(&self, event: Event, hint: &EventHint) -> Outcome {
        let _ = hint;
        Outcome::keep(event)
    }
}

// This is needed as a workaround to be able to safely downcast integrations
#[doc(hidden)]
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Runs an installed integration as a client level processor.
pub(crate) struct IntegrationProcessor(pub(crate) Arc<dyn Integration>);

impl EventProcessor for IntegrationProcessor {
    fn process_event(&self, event: Event, hint: &EventHint) -> Outcome {
        self.0.process_event(event, hint)
    }
}
