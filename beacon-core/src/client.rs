use std::any::{Any, TypeId};
use std::error::Error;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, SystemTime};

use futures::future::BoxFuture;
use futures::FutureExt;
use rand::random;

use crate::constants::SDK_INFO;
use crate::error::event_from_pipeline_failure;
use crate::eventprocessor::notify_event_processors;
use crate::integration::IntegrationProcessor;
use crate::protocol::{ClientSdkInfo, Event, Level, Map, SessionStatus};
use crate::session::Session;
use crate::transport::{NoopTransport, TransportRequest};
use crate::types::{random_uuid, Dsn, Uuid};
use crate::utils::{normalize_event, truncate};
use crate::{
    event_from_error, Breadcrumb, CaptureContext, CaptureError, ClientOptions, Envelope,
    EventHint, EventProcessor, Integration, Outcome, ProcessorTier, Scope, Transport,
};

impl<T: Into<ClientOptions>> From<T> for Client {
    fn from(o: T) -> Client {
        Client::with_options(o.into())
    }
}

/// The beacon Client.
///
/// The Client runs the event processing pipeline and hands prepared events
/// to the configured [`Transport`].  It owns a [`Scope`] which is merged into
/// every event it captures.
///
/// # Examples
///
/// ```
/// beacon_core::Client::from(beacon_core::ClientOptions::default());
/// ```
pub struct Client {
    options: ClientOptions,
    transport: Arc<dyn Transport>,
    scope: RwLock<Scope>,
    integrations: Vec<(TypeId, Arc<dyn Integration>)>,
    event_processors: RwLock<Vec<Arc<dyn EventProcessor>>>,
    enabled: AtomicBool,
    last_event_id: RwLock<Option<Uuid>>,
    last_exception: Mutex<Option<Arc<dyn Error + Send + Sync>>>,
    pub(crate) sdk_info: ClientSdkInfo,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("dsn", &self.dsn())
            .field("options", &self.options)
            .field("enabled", &self.enabled.load(Ordering::Relaxed))
            .finish()
    }
}

impl Client {
    /// Creates a new client from a config.
    ///
    /// # Supported Configs
    ///
    /// The following common values are supported for the client config:
    ///
    /// * `ClientOptions`: configure the client with the given client options.
    /// * `()` or empty string: Disable the client.
    /// * `&str` / `String`: configure the client with the given DSN.
    /// * `Dsn` / `&Dsn`: configure the client with a given DSN.
    /// * `(Dsn, ClientOptions)`: configure the client from the given DSN and optional options.
    ///
    /// # Panics
    ///
    /// The `Into<ClientOptions>` implementations can panic for the forms where a DSN needs to be
    /// parsed.  If you want to handle invalid DSNs you need to parse them manually by calling
    /// parse on it and handle the error.
    pub fn from_config<O: Into<ClientOptions>>(opts: O) -> Client {
        Client::with_options(opts.into())
    }

    /// Creates a new client for the given options.
    ///
    /// If the DSN on the options is set to `None` the client will be entirely
    /// disabled.  Without a transport factory events are handed to a
    /// [`NoopTransport`].
    pub fn with_options(mut options: ClientOptions) -> Client {
        let mut integrations: Vec<(TypeId, Arc<dyn Integration>)> = vec![];
        for integration in options.integrations.clone() {
            let name = integration.name();
            if integrations.iter().any(|(_, i)| i.name() == name) {
                beacon_debug!("[Client] Ignoring duplicate integration: {}", name);
                continue;
            }
            integrations.push((integration.as_ref().type_id(), integration));
        }

        let mut sdk_info = SDK_INFO.clone();
        for (_, integration) in integrations.iter() {
            beacon_debug!("[Client] Setting up integration: {}", integration.name());
            integration.setup(&mut options);
            sdk_info.integrations.push(integration.name().to_string());
        }

        let transport = match (options.dsn.as_ref(), options.transport.as_ref()) {
            (Some(_), Some(factory)) => factory.create_transport(&options),
            (None, _) => {
                beacon_debug!("[Client] No DSN configured, client is disabled");
                Arc::new(NoopTransport)
            }
            (Some(_), None) => {
                beacon_debug!("[Client] No transport configured, events are discarded");
                Arc::new(NoopTransport)
            }
        };

        let event_processors = integrations
            .iter()
            .map(|(_, integration)| {
                Arc::new(IntegrationProcessor(integration.clone())) as Arc<dyn EventProcessor>
            })
            .collect();

        let scope =
            Scope::with_breadcrumb_options(options.max_breadcrumbs, options.before_breadcrumb.clone());
        let enabled = AtomicBool::new(options.enabled);

        Client {
            options,
            transport,
            scope: RwLock::new(scope),
            integrations,
            event_processors: RwLock::new(event_processors),
            enabled,
            last_event_id: RwLock::new(None),
            last_exception: Mutex::new(None),
            sdk_info,
        }
    }

    /// Returns the installed integration of type `I`, if any.
    pub fn get_integration<I>(&self) -> Option<&I>
    where
        I: Integration,
    {
        let id = TypeId::of::<I>();
        let integration = &self.integrations.iter().find(|(iid, _)| *iid == id)?.1;
        integration.as_ref().as_any().downcast_ref()
    }

    /// Returns the options of this client.
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Returns the DSN that constructed this client.
    pub fn dsn(&self) -> Option<&Dsn> {
        self.options.dsn.as_ref()
    }

    /// Quick check to see if the client is enabled.
    ///
    /// The Client is enabled if it has a DSN, was not disabled through the
    /// options and has not been closed.
    ///
    /// # Examples
    ///
    /// ```
    /// let client = beacon_core::Client::from(beacon_core::ClientOptions::default());
    /// assert!(!client.is_enabled());
    ///
    /// let client = beacon_core::Client::from("https://public@example.com/1");
    /// assert!(client.is_enabled());
    /// ```
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst) && self.options.dsn.is_some()
    }

    /// Returns a copy of the client's scope.
    pub fn scope(&self) -> Scope {
        self.scope
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Invokes a function that can modify the client's scope.
    pub fn configure_scope<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut Scope) -> R,
    {
        let mut scope = self.scope.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut scope)
    }

    /// Adds a breadcrumb to the client's scope.
    pub fn add_breadcrumb(&self, breadcrumb: Breadcrumb) {
        self.configure_scope(|scope| scope.add_breadcrumb(breadcrumb));
    }

    /// Registers a client level event processor.
    ///
    /// Client processors run after the global and scope level ones, after
    /// those of installed integrations.
    pub fn add_event_processor<F>(&self, processor: F)
    where
        F: Fn(Event, &EventHint) -> Outcome + Send + Sync + 'static,
    {
        let mut processors = self
            .event_processors
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        processors.push(Arc::new(processor));
    }

    /// Returns the id of the last event handed to the transport.
    pub fn last_event_id(&self) -> Option<Uuid> {
        *self
            .last_event_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a random boolean with a probability defined
    /// by rate
    pub fn sample_should_send(&self, rate: f32) -> bool {
        if rate >= 1.0 {
            true
        } else if rate <= 0.0 {
            false
        } else {
            random::<f32>() < rate
        }
    }

    /// Captures an event.
    ///
    /// Returns the event id if the event was handed to the transport, or
    /// `None` if any stage of the pipeline dropped it.  The reason is logged.
    ///
    /// A capture whose hint carries the same original exception as the
    /// previous capture is dropped once.
    pub async fn capture_event(
        &self,
        event: Event,
        hint: Option<EventHint>,
        context: Option<CaptureContext>,
    ) -> Option<Uuid> {
        let hint = hint.unwrap_or_default();
        if let Some(exception) = hint.original_exception.as_ref() {
            let mut last = self
                .last_exception
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if last.as_ref().is_some_and(|prev| Arc::ptr_eq(prev, exception)) {
                *last = None;
                drop(last);
                beacon_debug!("[Client] Dropping duplicate capture of the same exception");
                return None;
            }
            *last = Some(exception.clone());
        }
        self.process_event(event, hint, context).await.ok()
    }

    /// Captures a plain message at the given level.
    pub async fn capture_message(
        &self,
        message: &str,
        level: Level,
        context: Option<CaptureContext>,
    ) -> Option<Uuid> {
        let event = Event {
            message: Some(message.to_owned()),
            level: Some(level),
            ..Default::default()
        };
        self.capture_event(event, None, context).await
    }

    /// Captures an error, including its chain of sources.
    pub async fn capture_exception(
        &self,
        error: Arc<dyn Error + Send + Sync>,
        context: Option<CaptureContext>,
    ) -> Option<Uuid> {
        let event = event_from_error(error.as_ref());
        self.capture_event(event, Some(EventHint::from_exception(error)), context)
            .await
    }

    /// Runs the full pipeline for an event and hands it to the transport.
    ///
    /// Unlike [`Client::capture_event`] this reports why an event was
    /// dropped.
    pub async fn process_event(
        &self,
        mut event: Event,
        hint: EventHint,
        context: Option<CaptureContext>,
    ) -> Result<Uuid, CaptureError> {
        let event_id = event.event_id.or(hint.event_id).unwrap_or_else(random_uuid);
        event.event_id = Some(event_id);

        match self.prepare_event(event, &hint, context).await {
            Ok(event) => {
                self.hand_off(event);
                Ok(event_id)
            }
            Err(err) => {
                beacon_debug!("[Client] Event {} was dropped: {}", event_id, err);
                Err(err)
            }
        }
    }

    /// Runs the pipeline up to, but not including, the transport hand-off.
    ///
    /// A panic anywhere in the pipeline is reported as a separate internal
    /// event, and this capture fails with [`CaptureError::PipelineFailure`].
    pub async fn prepare_event(
        &self,
        event: Event,
        hint: &EventHint,
        context: Option<CaptureContext>,
    ) -> Result<Event, CaptureError> {
        if !self.is_enabled() {
            return Err(CaptureError::ClientDisabled);
        }
        if !event.is_transaction() && !self.sample_should_send(self.options.sample_rate) {
            return Err(CaptureError::SampledOut);
        }

        match AssertUnwindSafe(self.run_pipeline(event, hint, context))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(payload) => {
                let reason = panic_message(&*payload).to_owned();
                beacon_debug!("[Client] Event pipeline panicked: {}", reason);
                if !hint.internal {
                    let failure = event_from_pipeline_failure(&reason);
                    if let Err(err) = self.process_internal(failure).await {
                        beacon_debug!("[Client] Could not report pipeline failure: {}", err);
                    }
                }
                Err(CaptureError::PipelineFailure(reason))
            }
        }
    }

    fn process_internal(&self, event: Event) -> BoxFuture<'_, Result<Uuid, CaptureError>> {
        let hint = EventHint {
            internal: true,
            ..Default::default()
        };
        self.process_event(event, hint, None).boxed()
    }

    async fn run_pipeline(
        &self,
        mut event: Event,
        hint: &EventHint,
        context: Option<CaptureContext>,
    ) -> Result<Event, CaptureError> {
        if event.event_id.is_none() {
            event.event_id = Some(hint.event_id.unwrap_or_else(random_uuid));
        }
        if event.timestamp.is_none() {
            event.timestamp = Some(SystemTime::now());
        }

        self.apply_client_options(&mut event);
        self.apply_sdk_metadata(&mut event);

        let scope = match context {
            Some(CaptureContext::Scope(scope)) => scope,
            Some(context) => {
                let mut scope = self.scope();
                scope.update(context);
                scope
            }
            None => self.scope(),
        };
        let mut event = scope
            .apply_to_event_inner(event, hint)
            .await
            .map_err(|tier| CaptureError::FilteredByProcessor { tier })?;

        let processors = self
            .event_processors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        event = notify_event_processors(&processors, event, hint)
            .await
            .map_err(|_| CaptureError::FilteredByProcessor {
                tier: ProcessorTier::Client,
            })?;

        if self.options.normalize_depth > 0 {
            normalize_event(&mut event, self.options.normalize_depth);
        }

        if !hint.internal && !event.is_transaction() {
            if let Some(ref before_send) = self.options.before_send {
                event = match before_send(event, hint) {
                    None => return Err(CaptureError::FilteredByUser),
                    Some(event) if event.event_id.is_none() => {
                        return Err(CaptureError::InvalidFilterResult)
                    }
                    Some(event) => event,
                };
            }
        }

        if !event.is_transaction() {
            if let Some(session) = scope.session() {
                session
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .update_from_event(&event);
                self.send_session(&session);
            }
        }

        Ok(event)
    }

    fn apply_client_options(&self, event: &mut Event) {
        if event.environment.is_none() {
            event.environment = Some(
                self.options
                    .environment
                    .clone()
                    .unwrap_or_else(|| "production".into()),
            );
        }
        if event.release.is_none() {
            event.release.clone_from(&self.options.release);
        }
        if event.dist.is_none() {
            event.dist.clone_from(&self.options.dist);
        }
        if event.server_name.is_none() {
            event.server_name.clone_from(&self.options.server_name);
        }

        let max = self.options.max_value_length;
        if max == 0 {
            return;
        }
        if let Some(message) = event.message.as_mut() {
            *message = truncate(message, max);
        }
        if let Some(value) = event
            .exception
            .values
            .first_mut()
            .and_then(|exception| exception.value.as_mut())
        {
            *value = truncate(value, max);
        }
        if let Some(url) = event
            .request
            .as_mut()
            .and_then(|request| request.url.as_mut())
        {
            *url = truncate(url, max);
        }
    }

    fn apply_sdk_metadata(&self, event: &mut Event) {
        let sdk = event.sdk.get_or_insert_with(|| ClientSdkInfo {
            name: self.sdk_info.name.clone(),
            version: self.sdk_info.version.clone(),
            ..Default::default()
        });
        sdk.integrations
            .extend(self.sdk_info.integrations.iter().cloned());
        sdk.packages.extend(self.sdk_info.packages.iter().cloned());
        sdk.packages
            .extend(self.options.sdk_packages.iter().cloned());
    }

    fn hand_off(&self, event: Event) {
        let event_id = event.event_id.unwrap_or_default();
        let is_transaction = event.is_transaction();
        let level = event.level.unwrap_or_default();
        let message = event.message.clone().or_else(|| {
            event.exception.last().map(|exception| match exception.value {
                Some(ref value) => format!("{}: {}", exception.ty, value),
                None => exception.ty.clone(),
            })
        });

        let mut envelope = Envelope::from_event(event);
        if self.options.sample_rate < 1.0 && !is_transaction {
            envelope.add_sample_rate("client_rate", self.options.sample_rate);
        }
        self.send_request(TransportRequest::new(envelope));

        *self
            .last_event_id
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(event_id);

        let mut data = Map::new();
        data.insert("event_id".into(), event_id.to_string().into());
        self.add_breadcrumb(Breadcrumb {
            category: Some(if is_transaction {
                "beacon.transaction".into()
            } else {
                "beacon.event".into()
            }),
            level,
            message,
            data,
            ..Default::default()
        });
    }

    /// Submits a request and logs whatever already settled.
    ///
    /// Requests are admitted synchronously, so the pending response is not
    /// awaited.
    fn send_request(&self, request: TransportRequest) {
        let category = request.category.clone();
        match self.transport.send_request(request).now_or_never() {
            Some(Ok(response)) => {
                beacon_debug!("[Client] Sent {} request: {:?}", category, response.status);
            }
            Some(Err(err)) => {
                beacon_debug!("[Client] Failed to send {} request: {}", category, err);
            }
            None => {}
        }
    }

    /// Starts a release health session on the client's scope.
    ///
    /// A session that is still open is ended as exited first.
    pub fn start_session(&self) {
        let previous = self.configure_scope(|scope| {
            let session = Session::new(
                self.options.release.clone().unwrap_or_default(),
                self.options.environment.clone(),
                scope.user(),
            );
            let previous = scope.session();
            scope.set_session(Some(session));
            previous
        });
        if let Some(previous) = previous {
            self.finish_session(&previous, SessionStatus::Exited);
        }
    }

    /// Sends the current state of the scope's session.
    ///
    /// Returns `false` if there is no session or it was discarded.
    pub fn capture_session(&self) -> bool {
        match self.configure_scope(|scope| scope.session()) {
            Some(session) => self.send_session(&session),
            None => false,
        }
    }

    /// Ends the scope's session with `status` and sends the final update.
    pub fn end_session(&self, status: SessionStatus) {
        let session = self.configure_scope(|scope| {
            let session = scope.session();
            scope.set_session(None);
            session
        });
        if let Some(session) = session {
            self.finish_session(&session, status);
        }
    }

    fn finish_session(&self, session: &Mutex<Session>, status: SessionStatus) {
        session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .close(status);
        self.send_session(session);
    }

    fn send_session(&self, session: &Mutex<Session>) -> bool {
        let update = {
            let mut session = session.lock().unwrap_or_else(PoisonError::into_inner);
            if session.release().is_empty() {
                drop(session);
                beacon_debug!("[Client] Discarding session without a release");
                return false;
            }
            let update = session.to_update();
            session.mark_sent();
            update
        };
        self.send_request(TransportRequest::new(Envelope::from_session(update)));
        true
    }

    /// Waits for the transport to deliver pending requests.
    ///
    /// Falls back to `shutdown_timeout` if no timeout is given.  Returns
    /// `true` if everything settled in time.
    pub async fn flush(&self, timeout: Option<Duration>) -> bool {
        let timeout = timeout.unwrap_or(self.options.shutdown_timeout);
        let result = self.transport.flush(timeout).await;
        beacon_debug!(
            "[Client] Flush completed: {}",
            if result { "success" } else { "timeout" }
        );
        result
    }

    /// Flushes and then permanently disables the client.
    pub async fn close(&self, timeout: Option<Duration>) -> bool {
        let result = self.flush(timeout).await;
        self.disable();
        beacon_debug!("[Client] Client closed");
        result
    }

    /// Permanently disables the client without waiting for the transport.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    match payload.downcast_ref::<&'static str>() {
        Some(s) => s,
        None => match payload.downcast_ref::<String>() {
            Some(s) => &s[..],
            None => "Box<Any>",
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(&*payload), "static");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&*payload), "owned");
        let payload: Box<dyn Any + Send> = Box::new(42);
        assert_eq!(panic_message(&*payload), "Box<Any>");
    }

    #[test]
    fn test_duplicate_integrations() {
        struct First;
        impl Integration for First {
            fn name(&self) -> &'static str {
                "dup"
            }
        }
        struct Second;
        impl Integration for Second {
            fn name(&self) -> &'static str {
                "dup"
            }
        }

        let client = Client::with_options(
            ClientOptions::default()
                .add_integration(First)
                .add_integration(Second),
        );
        assert!(client.get_integration::<First>().is_some());
        assert!(client.get_integration::<Second>().is_none());
        assert_eq!(client.sdk_info.integrations, ["dup"]);
    }

    #[tokio::test]
    async fn test_disabled_without_dsn() {
        let client = Client::from(ClientOptions::default());
        let result = client
            .process_event(Event::new(), EventHint::default(), None)
            .await;
        assert_eq!(result, Err(CaptureError::ClientDisabled));
    }
}
