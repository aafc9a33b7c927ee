use std::error::Error;
use std::fmt;

use thiserror::Error;

use crate::protocol::{Event, EventType, Exception, Level, Mechanism};
use crate::utils::parse_type_from_debug;

/// The processor tier that dropped an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProcessorTier {
    /// A process-wide processor registered through
    /// [`add_global_event_processor`](crate::add_global_event_processor).
    Global,
    /// A processor registered on the [`Scope`](crate::Scope).
    Scope,
    /// An integration or a processor registered on the [`Client`](crate::Client).
    Client,
}

impl fmt::Display for ProcessorTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProcessorTier::Global => "global",
            ProcessorTier::Scope => "scope",
            ProcessorTier::Client => "client",
        })
    }
}

/// The reason a capture did not reach the transport.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CaptureError {
    /// The client is disabled or has no DSN.
    #[error("client is disabled")]
    ClientDisabled,
    /// The event lost the `sample_rate` draw.
    #[error("event was sampled out")]
    SampledOut,
    /// An event processor returned `None`.
    #[error("event was dropped by a {tier} event processor")]
    FilteredByProcessor {
        /// The tier of the processor that dropped the event.
        tier: ProcessorTier,
    },
    /// `before_send` returned an event without an id.
    #[error("before_send returned an invalid event")]
    InvalidFilterResult,
    /// `before_send` returned `None`.
    #[error("event was dropped by before_send")]
    FilteredByUser,
    /// The pipeline panicked while preparing the event.
    #[error("event processing pipeline failed: {0}")]
    PipelineFailure(String),
}

/// Create an `Event` from a `std::error::Error`.
///
/// A chain of errors will be resolved as well, and sorted oldest to newest.
/// The outermost error carries a `generic` mechanism marked as handled.
///
/// # Examples
///
/// ```
/// use thiserror::Error;
///
/// #[derive(Debug, Error)]
/// #[error("inner")]
/// struct InnerError;
///
/// #[derive(Debug, Error)]
/// #[error("outer")]
/// struct OuterError(#[from] InnerError);
///
/// let event = beacon_core::event_from_error(&OuterError(InnerError));
/// assert_eq!(event.level, Some(beacon_core::Level::Error));
/// assert_eq!(event.exception.len(), 2);
/// assert_eq!(&event.exception[0].ty, "InnerError");
/// assert_eq!(event.exception[0].value, Some("inner".into()));
/// assert_eq!(&event.exception[1].ty, "OuterError");
/// assert_eq!(event.exception[1].value, Some("outer".into()));
/// ```
pub fn event_from_error<E: Error + ?Sized>(err: &E) -> Event {
    let mut outermost = exception_from_error(err);
    outermost.mechanism = Some(Mechanism {
        ty: "generic".into(),
        handled: Some(true),
        ..Default::default()
    });
    let mut exceptions = vec![outermost];

    let mut source = err.source();
    while let Some(err) = source {
        exceptions.push(exception_from_error(err));
        source = err.source();
    }

    exceptions.reverse();
    Event {
        ty: Some(EventType::Error),
        exception: exceptions.into(),
        level: Some(Level::Error),
        ..Default::default()
    }
}

fn exception_from_error<E: Error + ?Sized>(err: &E) -> Exception {
    Exception {
        ty: parse_type_from_debug(err),
        value: Some(err.to_string()),
        ..Default::default()
    }
}

/// Builds the event reported when the pipeline itself fails.
pub(crate) fn event_from_pipeline_failure(reason: &str) -> Event {
    Event {
        ty: Some(EventType::Error),
        level: Some(Level::Error),
        exception: vec![Exception {
            ty: "PipelineFailure".into(),
            value: Some(reason.to_owned()),
            mechanism: Some(Mechanism {
                ty: "internal".into(),
                handled: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        }]
        .into(),
        ..Default::default()
    }
}
