#![cfg(feature = "test")]

use std::sync::Arc;

use beacon::test::test_options;
use beacon::{ClientOptions, Hub, Level};

#[test]
fn test_init_binds_client() {
    let (options, transport) = test_options(ClientOptions {
        release: Some("app@1.0.0".into()),
        ..Default::default()
    });
    let hub = Arc::new(Hub::new(None));

    hub.run(|| {
        let guard = beacon::init(options);
        assert!(guard.is_enabled());
        assert!(Arc::ptr_eq(
            &guard.client(),
            &Hub::current().client().unwrap()
        ));

        let event_id = futures::executor::block_on(beacon::capture_message("hi", Level::Info));
        assert!(event_id.is_some());
        assert_eq!(beacon::last_event_id(), event_id);

        assert!(futures::executor::block_on(guard.close(None)));
        assert!(!guard.is_enabled());
        let after_close = futures::executor::block_on(beacon::capture_message("bye", Level::Info));
        assert_eq!(after_close, None);
    });

    let events = transport.fetch_and_clear_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].message.as_deref(), Some("hi"));
    assert_eq!(events[0].release.as_deref(), Some("app@1.0.0"));
}

#[test]
fn test_dropping_guard_disables_client() {
    let (options, transport) = test_options(ClientOptions::default());
    let hub = Arc::new(Hub::new(None));

    hub.run(|| {
        let client = {
            let guard = beacon::init(options);
            guard.client()
        };
        assert!(!client.is_enabled());
        assert_eq!(
            futures::executor::block_on(beacon::capture_message("late", Level::Error)),
            None
        );
    });

    assert!(transport.fetch_and_clear_requests().is_empty());
}

#[test]
fn test_init_without_dsn() {
    let hub = Arc::new(Hub::new(None));
    hub.run(|| {
        let guard = beacon::init(ClientOptions::default());
        assert!(!guard.is_enabled());
        assert!(guard.client().options().transport.is_some());
    });
}
