#![cfg(feature = "test")]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use beacon_core::protocol::{EventType, Exception, Mechanism, SessionStatus};
use beacon_core::test::{test_options, with_captured_events};
use beacon_core::{
    capture_message, CaptureContext, CaptureError, Client, ClientOptions, Event, EventHint,
    Integration, Level, Outcome, ProcessorTier, ScopeContext, TransportError, User,
};
use rstest::rstest;

#[derive(Debug, thiserror::Error)]
#[error("connection reset")]
struct ConnectionReset;

#[derive(Debug, thiserror::Error)]
#[error("request failed")]
struct RequestFailed(#[source] ConnectionReset);

fn crash() -> Event {
    Event {
        exception: vec![Exception {
            ty: "Panic".into(),
            mechanism: Some(Mechanism {
                ty: "panic".into(),
                handled: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        }]
        .into(),
        ..Default::default()
    }
}

fn message(text: &str) -> Event {
    Event {
        message: Some(text.into()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_capture_message_reaches_transport() {
    let (options, transport) = test_options(ClientOptions::default());
    let client = Client::from(options);

    let id = client.capture_message("hi", Level::Info, None).await;
    assert!(id.is_some());

    let events = transport.fetch_and_clear_events();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.message.as_deref(), Some("hi"));
    assert_eq!(event.event_id, id);
    assert!(event.timestamp.is_some());
    assert_eq!(event.environment.as_deref(), Some("production"));
    assert_eq!(event.sdk.as_ref().unwrap().name, "beacon.rust");
    assert_eq!(client.last_event_id(), id);
}

#[test]
fn test_free_functions_use_bound_hub() {
    let events = with_captured_events(|| async {
        capture_message("from hub", Level::Warning).await;
    });
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].level, Some(Level::Warning));
}

#[tokio::test]
async fn test_explicit_environment_is_kept() {
    let (options, transport) = test_options(ClientOptions {
        environment: Some("".into()),
        release: Some("app@1.0.0".into()),
        dist: Some("42".into()),
        ..Default::default()
    });
    let client = Client::from(options);
    client.capture_event(message("env"), None, None).await;

    let event = transport.fetch_and_clear_events().pop().unwrap();
    assert_eq!(event.environment.as_deref(), Some(""));
    assert_eq!(event.release.as_deref(), Some("app@1.0.0"));
    assert_eq!(event.dist.as_deref(), Some("42"));
}

#[rstest]
#[case(250, 253)]
#[case(10, 13)]
#[case(0, 300)]
#[tokio::test]
async fn test_message_truncation(#[case] max_value_length: usize, #[case] expected: usize) {
    let (options, transport) = test_options(ClientOptions {
        max_value_length,
        ..Default::default()
    });
    let client = Client::from(options);
    client
        .capture_event(message(&"x".repeat(300)), None, None)
        .await;

    let event = transport.fetch_and_clear_events().pop().unwrap();
    assert_eq!(event.message.unwrap().chars().count(), expected);
}

#[tokio::test]
async fn test_disabled_client() {
    let (options, transport) = test_options(ClientOptions {
        enabled: false,
        ..Default::default()
    });
    let client = Client::from(options);
    let result = client
        .process_event(message("off"), EventHint::default(), None)
        .await;
    assert_eq!(result, Err(CaptureError::ClientDisabled));
    assert!(transport.fetch_and_clear_requests().is_empty());
}

#[tokio::test]
async fn test_closed_client_stops_capturing() {
    let (options, transport) = test_options(ClientOptions::default());
    let client = Client::from(options);
    assert!(client.close(None).await);
    assert!(!client.is_enabled());
    assert_eq!(client.capture_message("late", Level::Info, None).await, None);
    assert!(transport.fetch_and_clear_requests().is_empty());
}

#[tokio::test]
async fn test_sampling() {
    let (options, transport) = test_options(ClientOptions {
        sample_rate: 0.0,
        ..Default::default()
    });
    let client = Client::from(options);
    let result = client
        .process_event(message("sampled"), EventHint::default(), None)
        .await;
    assert_eq!(result, Err(CaptureError::SampledOut));

    // transactions are sampled upstream
    let transaction = Event {
        ty: Some(EventType::Transaction),
        transaction: Some("GET /".into()),
        ..Default::default()
    };
    assert!(client.capture_event(transaction, None, None).await.is_some());
    let envelope = transport.fetch_and_clear_envelopes().pop().unwrap();
    assert_eq!(envelope.category(), "transaction");
    assert!(envelope.sample_rates().is_empty());
}

#[tokio::test]
async fn test_sample_rate_in_envelope() {
    let (options, transport) = test_options(ClientOptions {
        sample_rate: 0.5,
        ..Default::default()
    });
    let client = Client::from(options);
    for _ in 0..64 {
        client.capture_event(message("maybe"), None, None).await;
    }

    let envelopes = transport.fetch_and_clear_envelopes();
    assert!(!envelopes.is_empty());
    assert!(envelopes.len() < 64);
    let rate = &envelopes[0].sample_rates()[0];
    assert_eq!(rate.id, "client_rate");
    assert_eq!(rate.rate, 0.5);
}

#[tokio::test]
async fn test_scope_processor_drop() {
    let (options, transport) = test_options(ClientOptions::default());
    let client = Client::from(options);
    client.configure_scope(|scope| scope.add_event_processor(|_, _| Outcome::discard()));

    let result = client
        .process_event(message("dropped"), EventHint::default(), None)
        .await;
    assert_eq!(
        result,
        Err(CaptureError::FilteredByProcessor {
            tier: ProcessorTier::Scope
        })
    );
    assert!(transport.fetch_and_clear_requests().is_empty());
}

#[tokio::test]
async fn test_processor_tiers_run_in_order() {
    let (options, transport) = test_options(ClientOptions::default());
    let client = Client::from(options);
    client.configure_scope(|scope| {
        scope.add_event_processor(|mut event, _| {
            event.fingerprint.push("scope".into());
            Outcome::keep(event)
        })
    });
    client.add_event_processor(|mut event, _| {
        event.fingerprint.push("client".into());
        Outcome::pending(async move {
            tokio::task::yield_now().await;
            Some(event)
        })
    });
    client.add_event_processor(|mut event, _| {
        event.fingerprint.push("client-2".into());
        Outcome::keep(event)
    });

    client.capture_event(message("ordered"), None, None).await;
    let event = transport.fetch_and_clear_events().pop().unwrap();
    assert_eq!(event.fingerprint, ["scope", "client", "client-2"]);
}

#[tokio::test]
async fn test_client_processor_drop() {
    let (options, _transport) = test_options(ClientOptions::default());
    let client = Client::from(options);
    let later = Arc::new(AtomicUsize::new(0));
    let later_clone = later.clone();
    client.add_event_processor(|_, _| Outcome::discard());
    client.add_event_processor(move |event, _| {
        later_clone.fetch_add(1, Ordering::SeqCst);
        Outcome::keep(event)
    });

    let result = client
        .process_event(message("dropped"), EventHint::default(), None)
        .await;
    assert_eq!(
        result,
        Err(CaptureError::FilteredByProcessor {
            tier: ProcessorTier::Client
        })
    );
    assert_eq!(later.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_before_send() {
    let (options, transport) = test_options(ClientOptions::default().before_send(
        |mut event, hint| match event.message.as_deref() {
            Some("drop") => None,
            Some("invalid") => {
                event.event_id = None;
                Some(event)
            }
            _ => {
                event.tags.insert("hinted".into(), hint.data.len().to_string());
                Some(event)
            }
        },
    ));
    let client = Client::from(options);

    let result = client
        .process_event(message("drop"), EventHint::default(), None)
        .await;
    assert_eq!(result, Err(CaptureError::FilteredByUser));

    let result = client
        .process_event(message("invalid"), EventHint::default(), None)
        .await;
    assert_eq!(result, Err(CaptureError::InvalidFilterResult));

    let mut hint = EventHint::default();
    hint.data.insert("source".into(), "test".into());
    assert!(client
        .capture_event(message("keep"), Some(hint), None)
        .await
        .is_some());
    let event = transport.fetch_and_clear_events().pop().unwrap();
    assert_eq!(event.tags["hinted"], "1");
}

#[tokio::test]
async fn test_pipeline_failure_is_reported_once() {
    let (options, transport) = test_options(ClientOptions::default().before_send(|_, _| None));
    let client = Client::from(options);

    let result = client
        .process_event(
            message("boom"),
            EventHint::default(),
            Some(CaptureContext::transform(|_| panic!("transform failed"))),
        )
        .await;
    assert_eq!(
        result,
        Err(CaptureError::PipelineFailure("transform failed".into()))
    );

    // the internal report bypasses before_send
    let events = transport.fetch_and_clear_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].exception[0].ty, "PipelineFailure");
    assert_eq!(
        events[0].exception[0].value.as_deref(),
        Some("transform failed")
    );
}

#[tokio::test]
async fn test_panicking_before_send_is_reported_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let (options, transport) = test_options(ClientOptions::default().before_send(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        panic!("before_send failed")
    }));
    let client = Client::from(options);

    let result = client
        .process_event(message("boom"), EventHint::default(), None)
        .await;
    assert_eq!(
        result,
        Err(CaptureError::PipelineFailure("before_send failed".into()))
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let events = transport.fetch_and_clear_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].exception.len(), 1);
    assert_eq!(events[0].exception[0].ty, "PipelineFailure");
    assert_eq!(
        events[0].exception[0].value.as_deref(),
        Some("before_send failed")
    );
}

#[tokio::test]
async fn test_nested_extra_is_normalized() {
    let (options, transport) = test_options(ClientOptions::default());
    let client = Client::from(options);
    client.configure_scope(|scope| {
        scope.set_extra("deep", serde_json::json!({"a": {"b": {"c": 1}}}));
    });

    client.capture_event(message("nested"), None, None).await;
    let event = transport.fetch_and_clear_events().pop().unwrap();
    assert_eq!(
        event.extra["deep"],
        serde_json::json!({"a": {"b": "[Object]"}})
    );
}

#[tokio::test]
async fn test_fingerprint_merge() {
    let (options, transport) = test_options(ClientOptions::default());
    let client = Client::from(options);
    client.configure_scope(|scope| scope.set_fingerprint(Some(&["foo"][..])));

    let event = Event {
        fingerprint: vec!["bar".into()],
        ..Default::default()
    };
    client.capture_event(event, None, None).await;
    let event = transport.fetch_and_clear_events().pop().unwrap();
    assert_eq!(event.fingerprint, ["bar", "foo"]);
}

#[tokio::test]
async fn test_capture_context() {
    let (options, transport) = test_options(ClientOptions::default());
    let client = Client::from(options);
    client.configure_scope(|scope| {
        scope.set_tag("source", "scope");
        scope.set_tag("kept", "yes");
    });

    let partial = ScopeContext {
        tags: [("source".to_owned(), "capture".to_owned())]
            .into_iter()
            .collect(),
        level: Some(Level::Fatal),
        ..Default::default()
    };
    client
        .capture_event(message("partial"), None, Some(partial.into()))
        .await;
    let event = transport.fetch_and_clear_events().pop().unwrap();
    assert_eq!(event.tags["source"], "capture");
    assert_eq!(event.tags["kept"], "yes");
    assert_eq!(event.level, Some(Level::Fatal));

    // the client scope is not modified by a capture context
    assert_eq!(client.scope().tag("source"), Some("scope"));

    let mut replacement = beacon_core::Scope::default();
    replacement.set_tag("only", "override");
    client
        .capture_event(message("override"), None, Some(replacement.into()))
        .await;
    let event = transport.fetch_and_clear_events().pop().unwrap();
    assert_eq!(event.tags.get("kept"), None);
    assert_eq!(event.tags["only"], "override");
}

#[tokio::test]
async fn test_capture_exception_and_duplicate_guard() {
    let (options, transport) = test_options(ClientOptions::default());
    let client = Client::from(options);
    let error: Arc<dyn std::error::Error + Send + Sync> = Arc::new(RequestFailed(ConnectionReset));

    assert!(client.capture_exception(error.clone(), None).await.is_some());
    assert!(client.capture_exception(error.clone(), None).await.is_none());
    assert!(client.capture_exception(error, None).await.is_some());

    let events = transport.fetch_and_clear_events();
    assert_eq!(events.len(), 2);
    let exceptions = &events[0].exception;
    assert_eq!(exceptions.len(), 2);
    assert_eq!(exceptions[0].ty, "ConnectionReset");
    assert_eq!(exceptions[1].ty, "RequestFailed");
    assert_eq!(events[0].level, Some(Level::Error));
}

#[tokio::test]
async fn test_post_capture_breadcrumb() {
    let (options, transport) = test_options(ClientOptions::default());
    let client = Client::from(options);

    let first = client
        .capture_message("first", Level::Warning, None)
        .await
        .unwrap();
    let scope = client.scope();
    let breadcrumb = scope.breadcrumbs().last().unwrap();
    assert_eq!(breadcrumb.category.as_deref(), Some("beacon.event"));
    assert_eq!(breadcrumb.level, Level::Warning);
    assert_eq!(breadcrumb.message.as_deref(), Some("first"));
    assert_eq!(breadcrumb.data["event_id"], first.to_string());

    client.capture_message("second", Level::Info, None).await;
    let event = transport.fetch_and_clear_events().pop().unwrap();
    assert_eq!(event.breadcrumbs.len(), 1);
}

#[tokio::test]
async fn test_transport_failure_still_returns_id() {
    let (options, transport) = test_options(ClientOptions::default());
    transport.set_response(Err(TransportError::BufferFull));
    let client = Client::from(options);
    assert!(client.capture_message("lost", Level::Info, None).await.is_some());
    assert_eq!(transport.fetch_and_clear_requests().len(), 1);
}

struct Redact;

impl Integration for Redact {
    fn name(&self) -> &'static str {
        "redact"
    }

    fn setup(&self, options: &mut ClientOptions) {
        options.server_name = Some("redacted-host".into());
    }

    fn process_event(&self, mut event: Event, _hint: &EventHint) -> Outcome {
        if event.message.as_deref() == Some("secret") {
            return Outcome::discard();
        }
        event.user = None;
        Outcome::keep(event)
    }
}

#[tokio::test]
async fn test_integration() {
    let (options, transport) = test_options(
        ClientOptions {
            sdk_packages: vec![beacon_core::protocol::ClientSdkPackage {
                name: "cargo:my-app".into(),
                version: "1.0.0".into(),
            }],
            ..Default::default()
        }
        .add_integration(Redact),
    );
    let client = Client::from(options);
    client.configure_scope(|scope| {
        scope.set_user(Some(User {
            id: Some("42".into()),
            ..Default::default()
        }))
    });

    let result = client
        .process_event(message("secret"), EventHint::default(), None)
        .await;
    assert_eq!(
        result,
        Err(CaptureError::FilteredByProcessor {
            tier: ProcessorTier::Client
        })
    );

    client.capture_event(message("public"), None, None).await;
    let event = transport.fetch_and_clear_events().pop().unwrap();
    assert_eq!(event.user, None);
    assert_eq!(event.server_name.as_deref(), Some("redacted-host"));
    let sdk = event.sdk.unwrap();
    assert_eq!(sdk.integrations, ["redact"]);
    let packages: Vec<_> = sdk.packages.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(packages, ["cargo:beacon", "cargo:my-app"]);
}

#[tokio::test]
async fn test_sessions() {
    let (options, transport) = test_options(ClientOptions {
        release: Some("app@1.0.0".into()),
        ..Default::default()
    });
    let client = Client::from(options);
    client.configure_scope(|scope| {
        scope.set_user(Some(User {
            username: Some("ferris".into()),
            ..Default::default()
        }))
    });
    client.start_session();

    client.capture_message("info", Level::Info, None).await;
    let sessions = transport.fetch_and_clear_sessions();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].errors, 0);
    assert!(sessions[0].init);
    assert_eq!(sessions[0].distinct_id.as_deref(), Some("ferris"));

    // messages without exceptions never count as errors
    client.capture_message("bad", Level::Error, None).await;
    let sessions = transport.fetch_and_clear_sessions();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].errors, 0);
    assert!(!sessions[0].init);

    for _ in 0..2 {
        client.capture_event(crash(), None, None).await;
    }
    let sessions = transport.fetch_and_clear_sessions();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[1].errors, 2);
    assert_eq!(sessions[1].status, SessionStatus::Crashed);

    client.end_session(SessionStatus::Exited);
    let sessions = transport.fetch_and_clear_sessions();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].status, SessionStatus::Crashed);
    assert!(!sessions[0].init);
    assert!(client.scope().session().is_none());
}

#[tokio::test]
async fn test_session_without_release_is_discarded() {
    let (options, transport) = test_options(ClientOptions::default());
    let client = Client::from(options);
    client.start_session();
    assert!(!client.capture_session());
    assert!(transport.fetch_and_clear_sessions().is_empty());
}
