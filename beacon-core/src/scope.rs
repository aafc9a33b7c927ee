use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use crate::clientoptions::BeforeBreadcrumbCallback;
use crate::error::ProcessorTier;
use crate::eventprocessor::{global_event_processors, notify_event_processors};
use crate::protocol::{Breadcrumb, Context, Event, Level, Map, TraceContext, User, Value};
use crate::session::Session;
use crate::{EventHint, EventProcessor, Outcome};

/// The hard upper bound for breadcrumbs kept on a scope.
pub const MAX_BREADCRUMBS: usize = 100;

/// Callback invoked with the scope after each of its changes.
pub type ScopeListener = Arc<dyn Fn(&Scope) + Send + Sync>;

/// Out-of-band data handed to `before_breadcrumb`.
pub type BreadcrumbHint = Map<String, Value>;

/// The span that is currently active on a scope.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Span {
    /// The trace context attached to events captured while the span is active.
    pub trace: TraceContext,
    /// The name of the transaction the span belongs to.
    pub transaction: Option<String>,
}

/// A partial scope used to amend a capture.
///
/// Tags, extra and contexts are merged in with the partial winning on key
/// collisions.  The user and fingerprint replace the scope's values only if
/// they are non-empty, the level only if set.
#[derive(Clone, Debug, Default)]
pub struct ScopeContext {
    /// Tags to set.
    pub tags: HashMap<String, String>,
    /// Extra data to set.
    pub extra: HashMap<String, Value>,
    /// Contexts to set.
    pub contexts: HashMap<String, Context>,
    /// The user to set.
    pub user: Option<User>,
    /// The level to set.
    pub level: Option<Level>,
    /// The fingerprint to set.
    pub fingerprint: Vec<String>,
}

/// Per-capture adjustments to the scope.
pub enum CaptureContext {
    /// Use this scope instead of the client's scope.
    Scope(Scope),
    /// Merge this partial into a copy of the client's scope.
    Partial(ScopeContext),
    /// Derive a scope from a copy of the client's scope.
    ///
    /// Returning `None` keeps the copy unchanged.
    Transform(Box<dyn FnOnce(&Scope) -> Option<Scope> + Send>),
}

impl CaptureContext {
    /// Creates a transforming context from a closure.
    pub fn transform<F>(f: F) -> CaptureContext
    where
        F: FnOnce(&Scope) -> Option<Scope> + Send + 'static,
    {
        CaptureContext::Transform(Box::new(f))
    }
}

impl From<Scope> for CaptureContext {
    fn from(scope: Scope) -> Self {
        CaptureContext::Scope(scope)
    }
}

impl From<ScopeContext> for CaptureContext {
    fn from(context: ScopeContext) -> Self {
        CaptureContext::Partial(context)
    }
}

impl fmt::Debug for CaptureContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureContext::Scope(scope) => f.debug_tuple("Scope").field(scope).finish(),
            CaptureContext::Partial(partial) => f.debug_tuple("Partial").field(partial).finish(),
            CaptureContext::Transform(_) => f.write_str("Transform(..)"),
        }
    }
}

/// Holds contextual data for the current scope.
///
/// The scope is an object that can be cloned efficiently and stores data that
/// is locally relevant to an event.  For instance the scope will hold recorded
/// breadcrumbs and similar information.
///
/// Cloning shares the underlying maps until one side is modified, so a clone
/// and its parent never observe each other's later changes.
#[derive(Clone)]
pub struct Scope {
    pub(crate) level: Option<Level>,
    pub(crate) fingerprint: Option<Arc<[String]>>,
    pub(crate) transaction: Option<Arc<str>>,
    pub(crate) breadcrumbs: Arc<VecDeque<Breadcrumb>>,
    pub(crate) user: Option<Arc<User>>,
    pub(crate) extra: Arc<HashMap<String, Value>>,
    pub(crate) tags: Arc<HashMap<String, String>>,
    pub(crate) contexts: Arc<HashMap<String, Context>>,
    pub(crate) event_processors: Arc<Vec<Arc<dyn EventProcessor>>>,
    pub(crate) span: Option<Arc<Span>>,
    pub(crate) session: Option<Arc<Mutex<Session>>>,
    pub(crate) max_breadcrumbs: usize,
    pub(crate) before_breadcrumb: Option<BeforeBreadcrumbCallback>,
    pub(crate) listeners: Arc<Vec<ScopeListener>>,
}

impl Default for Scope {
    fn default() -> Scope {
        Scope {
            level: None,
            fingerprint: None,
            transaction: None,
            breadcrumbs: Default::default(),
            user: None,
            extra: Default::default(),
            tags: Default::default(),
            contexts: Default::default(),
            event_processors: Default::default(),
            span: None,
            session: None,
            max_breadcrumbs: MAX_BREADCRUMBS,
            before_breadcrumb: None,
            listeners: Default::default(),
        }
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("level", &self.level)
            .field("fingerprint", &self.fingerprint)
            .field("transaction", &self.transaction)
            .field("breadcrumbs", &self.breadcrumbs)
            .field("user", &self.user)
            .field("extra", &self.extra)
            .field("tags", &self.tags)
            .field("contexts", &self.contexts)
            .field("event_processors", &self.event_processors.len())
            .field("span", &self.span)
            .field("session", &self.session)
            .field("max_breadcrumbs", &self.max_breadcrumbs)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Scope {
    /// Creates an empty scope that keeps at most `max_breadcrumbs`
    /// breadcrumbs and runs `before_breadcrumb` on insertion.
    pub fn with_breadcrumb_options(
        max_breadcrumbs: usize,
        before_breadcrumb: Option<BeforeBreadcrumbCallback>,
    ) -> Scope {
        Scope {
            max_breadcrumbs,
            before_breadcrumb,
            ..Default::default()
        }
    }

    /// Clear the scope.
    ///
    /// Breadcrumb limits, the `before_breadcrumb` callback and listeners
    /// are kept.
    pub fn clear(&mut self) {
        beacon_debug!("[Scope] Clearing all scope data");
        let listeners = std::mem::take(&mut self.listeners);
        *self = Scope {
            listeners,
            ..Scope::with_breadcrumb_options(self.max_breadcrumbs, self.before_breadcrumb.take())
        };
        self.notify_listeners();
    }

    /// Registers a callback that is invoked after every change to the scope.
    ///
    /// Listeners are carried over to clones of the scope.  They run while
    /// the scope is borrowed for modification, so a listener must not go
    /// through the client to reach the same scope again.
    pub fn add_scope_listener<F>(&mut self, f: F)
    where
        F: Fn(&Scope) + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.listeners).push(Arc::new(f));
    }

    fn notify_listeners(&self) {
        for listener in self.listeners.iter() {
            listener(self);
        }
    }

    /// Adds a breadcrumb.
    ///
    /// See [`Scope::add_breadcrumb_with_hint`].
    pub fn add_breadcrumb(&mut self, breadcrumb: Breadcrumb) {
        self.add_breadcrumb_with_hint(breadcrumb, &BreadcrumbHint::new());
    }

    /// Adds a breadcrumb, passing `hint` to `before_breadcrumb`.
    ///
    /// A missing timestamp is set to now.  If `before_breadcrumb` returns
    /// `None` the breadcrumb is discarded.  The oldest breadcrumbs are
    /// evicted once more than `min(max_breadcrumbs, 100)` are stored.
    pub fn add_breadcrumb_with_hint(&mut self, mut breadcrumb: Breadcrumb, hint: &BreadcrumbHint) {
        let limit = self.max_breadcrumbs.min(MAX_BREADCRUMBS);
        if limit == 0 {
            return;
        }
        if breadcrumb.timestamp.is_none() {
            breadcrumb.timestamp = Some(SystemTime::now());
        }
        let breadcrumb = match self.before_breadcrumb {
            Some(ref callback) => match callback(breadcrumb, hint) {
                Some(breadcrumb) => breadcrumb,
                None => {
                    beacon_debug!("[Scope] before_breadcrumb discarded a breadcrumb");
                    return;
                }
            },
            None => breadcrumb,
        };
        let breadcrumbs = Arc::make_mut(&mut self.breadcrumbs);
        breadcrumbs.push_back(breadcrumb);
        while breadcrumbs.len() > limit {
            breadcrumbs.pop_front();
        }
        self.notify_listeners();
    }

    /// Deletes current breadcrumbs from the scope.
    pub fn clear_breadcrumbs(&mut self) {
        let previous_count = self.breadcrumbs.len();
        self.breadcrumbs = Default::default();
        beacon_debug!("[Scope] Cleared {} breadcrumbs", previous_count);
        self.notify_listeners();
    }

    /// Returns the stored breadcrumbs, oldest first.
    pub fn breadcrumbs(&self) -> impl Iterator<Item = &Breadcrumb> {
        self.breadcrumbs.iter()
    }

    /// Sets a level override.
    pub fn set_level(&mut self, level: Option<Level>) {
        self.level = level;
        self.notify_listeners();
    }

    /// Returns the level override.
    pub fn level(&self) -> Option<Level> {
        self.level
    }

    /// Sets the fingerprint.
    pub fn set_fingerprint(&mut self, fingerprint: Option<&[&str]>) {
        self.fingerprint = fingerprint.map(|fp| fp.iter().map(|s| (*s).to_owned()).collect());
        self.notify_listeners();
    }

    /// Returns the fingerprint.
    pub fn fingerprint(&self) -> Option<&[String]> {
        self.fingerprint.as_deref()
    }

    /// Sets the transaction.
    pub fn set_transaction(&mut self, transaction: Option<&str>) {
        self.transaction = transaction.map(Arc::from);
        self.notify_listeners();
    }

    /// Returns the transaction name.
    pub fn transaction(&self) -> Option<&str> {
        self.transaction.as_deref()
    }

    /// Sets the user for the current scope.
    pub fn set_user(&mut self, user: Option<User>) {
        self.user = user.map(Arc::new);
        self.notify_listeners();
    }

    /// Retrieves the user of the current scope.
    pub fn user(&self) -> Option<&User> {
        self.user.as_deref()
    }

    /// Sets a tag to a specific value.
    pub fn set_tag<V: ToString>(&mut self, key: &str, value: V) {
        Arc::make_mut(&mut self.tags).insert(key.to_string(), value.to_string());
        self.notify_listeners();
    }

    /// Removes a tag.
    ///
    /// If the tag is not set, does nothing.
    pub fn remove_tag(&mut self, key: &str) {
        Arc::make_mut(&mut self.tags).remove(key);
        self.notify_listeners();
    }

    /// Sets several tags at once.
    pub fn set_tags<I, K, V>(&mut self, tags: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        Arc::make_mut(&mut self.tags).extend(
            tags.into_iter()
                .map(|(key, value)| (key.into(), value.to_string())),
        );
        self.notify_listeners();
    }

    /// Returns the value of a tag.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Returns all tags.
    pub fn tags(&self) -> &HashMap<String, String> {
        &self.tags
    }

    /// Sets a context for a key.
    pub fn set_context<C: Into<Context>>(&mut self, key: &str, value: C) {
        Arc::make_mut(&mut self.contexts).insert(key.to_string(), value.into());
        self.notify_listeners();
    }

    /// Removes a context for a key.
    pub fn remove_context(&mut self, key: &str) {
        Arc::make_mut(&mut self.contexts).remove(key);
        self.notify_listeners();
    }

    /// Returns all contexts.
    pub fn contexts(&self) -> &HashMap<String, Context> {
        &self.contexts
    }

    /// Sets a extra to a specific value.
    pub fn set_extra(&mut self, key: &str, value: Value) {
        Arc::make_mut(&mut self.extra).insert(key.to_string(), value);
        self.notify_listeners();
    }

    /// Removes a extra.
    pub fn remove_extra(&mut self, key: &str) {
        Arc::make_mut(&mut self.extra).remove(key);
        self.notify_listeners();
    }

    /// Sets several extras at once.
    pub fn set_extras<I, K>(&mut self, extras: I)
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Arc::make_mut(&mut self.extra)
            .extend(extras.into_iter().map(|(key, value)| (key.into(), value)));
        self.notify_listeners();
    }

    /// Returns all extra data.
    pub fn extra(&self) -> &HashMap<String, Value> {
        &self.extra
    }

    /// Set the given [`Span`] as the active span for this scope.
    pub fn set_span(&mut self, span: Option<Span>) {
        self.span = span.map(Arc::new);
        self.notify_listeners();
    }

    /// Returns the currently active span.
    pub fn span(&self) -> Option<&Span> {
        self.span.as_deref()
    }

    /// Attaches a release health session to the scope.
    pub fn set_session(&mut self, session: Option<Session>) {
        self.session = session.map(|session| Arc::new(Mutex::new(session)));
        self.notify_listeners();
    }

    /// Returns the session shared by this scope and its clones.
    pub fn session(&self) -> Option<Arc<Mutex<Session>>> {
        self.session.clone()
    }

    /// Add an event processor to the scope.
    pub fn add_event_processor<F>(&mut self, f: F)
    where
        F: Fn(Event, &EventHint) -> Outcome + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.event_processors).push(Arc::new(f));
        beacon_debug!(
            "[Scope] Added event processor (total: {})",
            self.event_processors.len()
        );
    }

    /// Merges a capture context into this scope.
    ///
    /// For a [`Scope`] or [`ScopeContext`] the incoming tags, extra and
    /// contexts win on key collisions, and the user, level and fingerprint
    /// are replaced only when the incoming value is set and non-empty.  A
    /// transform replaces this scope with its result, or keeps it unchanged
    /// if it returns `None`.
    pub fn update<C: Into<CaptureContext>>(&mut self, context: C) -> &mut Self {
        match context.into() {
            CaptureContext::Scope(other) => {
                if !other.tags.is_empty() {
                    Arc::make_mut(&mut self.tags)
                        .extend(other.tags.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                if !other.extra.is_empty() {
                    Arc::make_mut(&mut self.extra)
                        .extend(other.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                if !other.contexts.is_empty() {
                    Arc::make_mut(&mut self.contexts)
                        .extend(other.contexts.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                if other.user.as_deref().is_some_and(|user| !user.is_empty()) {
                    self.user = other.user;
                }
                if other.level.is_some() {
                    self.level = other.level;
                }
                if other.fingerprint.as_deref().is_some_and(|fp| !fp.is_empty()) {
                    self.fingerprint = other.fingerprint;
                }
            }
            CaptureContext::Partial(partial) => {
                if !partial.tags.is_empty() {
                    Arc::make_mut(&mut self.tags).extend(partial.tags);
                }
                if !partial.extra.is_empty() {
                    Arc::make_mut(&mut self.extra).extend(partial.extra);
                }
                if !partial.contexts.is_empty() {
                    Arc::make_mut(&mut self.contexts).extend(partial.contexts);
                }
                if let Some(user) = partial.user.filter(|user| !user.is_empty()) {
                    self.user = Some(Arc::new(user));
                }
                if partial.level.is_some() {
                    self.level = partial.level;
                }
                if !partial.fingerprint.is_empty() {
                    self.fingerprint = Some(partial.fingerprint.into());
                }
            }
            CaptureContext::Transform(transform) => match transform(self) {
                Some(updated) => *self = updated,
                None => {
                    beacon_debug!("[Scope] Scope transform returned nothing, keeping scope");
                }
            },
        }
        self.notify_listeners();
        self
    }

    /// Applies the contained scoped data to fill an event.
    ///
    /// Data already present on the event wins over the scope's.  Afterwards
    /// the global and then the scope's own event processors run in order; if
    /// any of them drops the event, `None` is returned.
    pub async fn apply_to_event(&self, event: Event, hint: &EventHint) -> Option<Event> {
        self.apply_to_event_inner(event, hint).await.ok()
    }

    pub(crate) async fn apply_to_event_inner(
        &self,
        mut event: Event,
        hint: &EventHint,
    ) -> Result<Event, ProcessorTier> {
        for (key, value) in self.extra.iter() {
            event
                .extra
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        for (key, value) in self.tags.iter() {
            event
                .tags
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        for (key, value) in self.contexts.iter() {
            event
                .contexts
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        if let Some(user) = self.user.as_deref() {
            match event.user {
                Some(ref mut event_user) => event_user.fill_from(user),
                None => event.user = Some(user.clone()),
            }
        }

        if event.level.is_none() {
            event.level = self.level;
        }
        if event.transaction.is_none() {
            event.transaction = self.transaction.as_deref().map(str::to_owned);
        }
        if let Some(span) = self.span.as_deref() {
            event
                .contexts
                .entry("trace".into())
                .or_insert_with(|| span.trace.clone().into());
            if let Some(name) = span.transaction.as_ref() {
                event
                    .tags
                    .entry("transaction".into())
                    .or_insert_with(|| name.clone());
            }
        }

        self.apply_fingerprint(&mut event);

        if !self.breadcrumbs.is_empty() {
            event.breadcrumbs.extend(self.breadcrumbs.iter().cloned());
        }

        let global = global_event_processors();
        let event = notify_event_processors(&global, event, hint)
            .await
            .map_err(|index| {
                beacon_debug!("[Scope] Global event processor {} dropped the event", index + 1);
                ProcessorTier::Global
            })?;
        notify_event_processors(&self.event_processors, event, hint)
            .await
            .map_err(|index| {
                beacon_debug!("[Scope] Event processor {} dropped the event", index + 1);
                ProcessorTier::Scope
            })
    }

    fn apply_fingerprint(&self, event: &mut Event) {
        let scope_fingerprint = self.fingerprint.as_deref().unwrap_or_default();
        if scope_fingerprint.is_empty() {
            dedupe(&mut event.fingerprint);
            return;
        }
        event.fingerprint.extend(scope_fingerprint.iter().cloned());
        dedupe(&mut event.fingerprint);
    }
}

fn dedupe(values: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    values.retain(|value| seen.insert(value.clone()));
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::protocol::SpanId;

    fn crumb(message: &str) -> Breadcrumb {
        Breadcrumb {
            message: Some(message.into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_breadcrumbs_are_bounded_fifo() {
        let mut scope = Scope::with_breadcrumb_options(3, None);
        for i in 0..10 {
            scope.add_breadcrumb(crumb(&i.to_string()));
        }
        let messages: Vec<_> = scope
            .breadcrumbs()
            .map(|b| b.message.clone().unwrap())
            .collect();
        assert_eq!(messages, ["7", "8", "9"]);
        assert!(scope.breadcrumbs().all(|b| b.timestamp.is_some()));
    }

    #[test]
    fn test_breadcrumbs_absolute_maximum() {
        let mut scope = Scope::with_breadcrumb_options(500, None);
        for i in 0..150 {
            scope.add_breadcrumb(crumb(&i.to_string()));
        }
        assert_eq!(scope.breadcrumbs().count(), MAX_BREADCRUMBS);
        assert_eq!(
            scope.breadcrumbs().next().and_then(|b| b.message.as_deref()),
            Some("50")
        );
    }

    #[test]
    fn test_before_breadcrumb_can_veto() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        let callback: BeforeBreadcrumbCallback = Arc::new(move |b: Breadcrumb, hint: &BreadcrumbHint| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
            if hint.contains_key("drop") {
                None
            } else {
                Some(b)
            }
        });
        let mut scope = Scope::with_breadcrumb_options(10, Some(callback));

        let mut hint = BreadcrumbHint::new();
        hint.insert("drop".into(), true.into());
        scope.add_breadcrumb_with_hint(crumb("dropped"), &hint);
        scope.add_breadcrumb(crumb("kept"));

        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert_eq!(scope.breadcrumbs().count(), 1);
    }

    #[test]
    fn test_scope_listeners() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen_tags = Arc::new(Mutex::new(Vec::new()));
        let mut scope = Scope::default();
        {
            let calls = calls.clone();
            let seen_tags = seen_tags.clone();
            scope.add_scope_listener(move |scope| {
                calls.fetch_add(1, Ordering::SeqCst);
                seen_tags.lock().unwrap().push(scope.tags().len());
            });
        }

        scope.set_tags([("a", "1"), ("b", "2")]);
        scope.set_extras([("payload", json!({"k": "v"}))]);
        scope.set_level(Some(Level::Warning));
        scope.add_breadcrumb(crumb("one"));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(seen_tags.lock().unwrap()[0], 2);
        assert_eq!(scope.extra()["payload"], json!({"k": "v"}));

        // clones keep notifying, clear keeps the listener
        let mut copy = scope.clone();
        copy.remove_tag("a");
        copy.clear();
        copy.set_user(None);
        assert_eq!(calls.load(Ordering::SeqCst), 7);
        assert_eq!(*seen_tags.lock().unwrap().last().unwrap(), 0);
    }

    #[test]
    fn test_clone_independence() {
        let mut parent = Scope::default();
        parent.set_tag("a", "1");
        let mut child = parent.clone();

        parent.set_tag("b", "2");
        child.set_tag("c", "3");
        child.add_event_processor(|event, _| Outcome::keep(event));

        assert_eq!(parent.tags().len(), 2);
        assert_eq!(child.tags().len(), 2);
        assert_eq!(child.tag("b"), None);
        assert_eq!(parent.tag("c"), None);
        assert_eq!(parent.event_processors.len(), 0);
        assert_eq!(child.event_processors.len(), 1);
    }

    #[test]
    fn test_clone_shares_session() {
        let mut parent = Scope::default();
        parent.set_session(Some(Session::new("app@1.0".into(), None, None)));
        let child = parent.clone();
        assert!(Arc::ptr_eq(
            &parent.session().unwrap(),
            &child.session().unwrap()
        ));
    }

    #[test]
    fn test_update_with_partial() {
        let mut scope = Scope::default();
        scope.set_tag("a", "scope");
        scope.set_level(Some(Level::Info));
        scope.set_user(Some(User {
            id: Some("1".into()),
            ..Default::default()
        }));

        scope.update(ScopeContext {
            tags: [("a".to_owned(), "partial".to_owned())].into_iter().collect(),
            user: Some(User::default()),
            level: Some(Level::Fatal),
            ..Default::default()
        });

        assert_eq!(scope.tag("a"), Some("partial"));
        assert_eq!(scope.level(), Some(Level::Fatal));
        assert_eq!(scope.user().and_then(|u| u.id.as_deref()), Some("1"));
        assert_eq!(scope.fingerprint(), None);
    }

    #[test]
    fn test_update_with_scope() {
        let mut scope = Scope::default();
        scope.set_extra("x", json!(1));
        let mut other = Scope::default();
        other.set_extra("x", json!(2));
        other.set_fingerprint(Some(&["fp"][..]));

        scope.update(other);
        assert_eq!(scope.extra()["x"], json!(2));
        assert_eq!(scope.fingerprint(), Some(&["fp".to_owned()][..]));
    }

    #[test]
    fn test_update_with_transform() {
        let mut scope = Scope::default();
        scope.set_tag("keep", "yes");

        scope.update(CaptureContext::transform(|_| None));
        assert_eq!(scope.tag("keep"), Some("yes"));

        scope.update(CaptureContext::transform(|current| {
            let mut next = current.clone();
            next.set_tag("added", "1");
            Some(next)
        }));
        assert_eq!(scope.tag("added"), Some("1"));
        assert_eq!(scope.tag("keep"), Some("yes"));
    }

    #[tokio::test]
    async fn test_apply_event_wins() {
        let mut scope = Scope::default();
        scope.set_tag("shared", "scope");
        scope.set_tag("only_scope", "scope");
        scope.set_level(Some(Level::Warning));
        scope.set_transaction(Some("scope-tx"));
        scope.set_user(Some(User {
            id: Some("scope".into()),
            email: Some("scope@example.com".into()),
            ..Default::default()
        }));

        let mut event = Event::new();
        event.tags.insert("shared".into(), "event".into());
        event.level = Some(Level::Error);
        event.user = Some(User {
            id: Some("event".into()),
            ..Default::default()
        });

        let event = scope
            .apply_to_event(event, &EventHint::default())
            .await
            .unwrap();
        assert_eq!(event.tags["shared"], "event");
        assert_eq!(event.tags["only_scope"], "scope");
        assert_eq!(event.level, Some(Level::Error));
        assert_eq!(event.transaction.as_deref(), Some("scope-tx"));
        let user = event.user.unwrap();
        assert_eq!(user.id.as_deref(), Some("event"));
        assert_eq!(user.email.as_deref(), Some("scope@example.com"));
    }

    #[tokio::test]
    async fn test_apply_fingerprint_merge() {
        let mut scope = Scope::default();
        scope.set_fingerprint(Some(&["foo", "bar"][..]));
        let event = Event {
            fingerprint: vec!["bar".into()],
            ..Default::default()
        };
        let event = scope
            .apply_to_event(event, &EventHint::default())
            .await
            .unwrap();
        assert_eq!(event.fingerprint, ["bar", "foo"]);

        let event = Scope::default()
            .apply_to_event(Event::new(), &EventHint::default())
            .await
            .unwrap();
        assert!(event.fingerprint.is_empty());
        assert!(!serde_json::to_string(&event).unwrap().contains("fingerprint"));
    }

    #[tokio::test]
    async fn test_apply_breadcrumbs_and_span() {
        let mut scope = Scope::default();
        scope.add_breadcrumb(crumb("scope"));
        let span_id: SpanId = "d42cee9fc3e74f5c".parse().unwrap();
        scope.set_span(Some(Span {
            trace: TraceContext {
                span_id,
                ..Default::default()
            },
            transaction: Some("GET /users".into()),
        }));

        let mut event = Event::new();
        event.breadcrumbs.values.push(crumb("event"));
        let event = scope
            .apply_to_event(event, &EventHint::default())
            .await
            .unwrap();

        let messages: Vec<_> = event
            .breadcrumbs
            .iter()
            .filter_map(|b| b.message.as_deref())
            .collect();
        assert_eq!(messages, ["event", "scope"]);
        assert_eq!(event.tags["transaction"], "GET /users");
        match &event.contexts["trace"] {
            Context::Trace(trace) => assert_eq!(trace.span_id, span_id),
            other => panic!("unexpected context {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_scope_processor_drop() {
        let mut scope = Scope::default();
        scope.add_event_processor(|_, _| Outcome::discard());
        let result = scope
            .apply_to_event_inner(Event::new(), &EventHint::default())
            .await;
        assert_eq!(result.err(), Some(ProcessorTier::Scope));
    }
}
