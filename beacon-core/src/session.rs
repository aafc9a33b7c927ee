//! Release Health Sessions
//!
//! A session counts the errors seen while it is active and records whether
//! the application crashed.  It lives on the [`Scope`](crate::Scope) and is
//! shared by all clones of that scope.

use std::borrow::Cow;
use std::time::{Instant, SystemTime};

use crate::protocol::{Event, SessionAttributes, SessionStatus, SessionUpdate, User};
use crate::types::random_uuid;

/// A release health session.
#[derive(Clone, Debug)]
pub struct Session {
    session_update: SessionUpdate,
    started: Instant,
}

impl Session {
    /// Starts a new session.
    ///
    /// The distinct id is taken from the user's id, email or username, in
    /// that order.
    pub fn new(
        release: Cow<'static, str>,
        environment: Option<Cow<'static, str>>,
        user: Option<&User>,
    ) -> Session {
        let distinct_id = user.and_then(distinct_id);
        Session {
            session_update: SessionUpdate {
                session_id: random_uuid(),
                distinct_id,
                sequence: None,
                timestamp: None,
                started: SystemTime::now(),
                init: true,
                duration: None,
                status: SessionStatus::Ok,
                errors: 0,
                attributes: SessionAttributes {
                    release,
                    environment,
                    ip_address: None,
                    user_agent: None,
                },
            },
            started: Instant::now(),
        }
    }

    /// Folds a captured event into the session.
    ///
    /// Events carrying exceptions count as one error; an exception whose
    /// mechanism is not handled also marks the session as crashed.  The
    /// event's user and request user agent are picked up as well.
    pub fn update_from_event(&mut self, event: &Event) {
        let errored = !event.exception.is_empty();
        let crashed = event
            .exception
            .iter()
            .filter_map(|exception| exception.mechanism.as_ref())
            .any(|mechanism| mechanism.handled == Some(false));

        if crashed {
            self.session_update.status = SessionStatus::Crashed;
        }
        if errored {
            self.session_update.errors = self.session_update.errors.saturating_add(1);
        }
        if let Some(distinct_id) = event.user.as_ref().and_then(distinct_id) {
            self.session_update.distinct_id = Some(distinct_id);
        }
        let attributes = &mut self.session_update.attributes;
        if attributes.user_agent.is_none() {
            attributes.user_agent = event.request.as_ref().and_then(|request| {
                request
                    .headers
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case("user-agent"))
                    .map(|(_, value)| value.clone())
            });
        }
        self.session_update.timestamp = Some(SystemTime::now());
    }

    /// Ends the session with `status`.
    ///
    /// `ok` is reported as `exited`.  A session that is no longer `ok` keeps
    /// its status.
    pub fn close(&mut self, status: SessionStatus) {
        if self.session_update.status != SessionStatus::Ok {
            return;
        }
        self.session_update.status = match status {
            SessionStatus::Ok => SessionStatus::Exited,
            status => status,
        };
        self.session_update.duration = Some(self.started.elapsed().as_secs_f64());
        self.session_update.timestamp = Some(SystemTime::now());
    }

    /// Returns the wire representation of the session.
    pub fn to_update(&self) -> SessionUpdate {
        self.session_update.clone()
    }

    /// Marks the initial transmission as done.
    pub(crate) fn mark_sent(&mut self) {
        self.session_update.init = false;
    }

    /// The release the session belongs to.
    pub fn release(&self) -> &str {
        &self.session_update.attributes.release
    }

    /// The current status.
    pub fn status(&self) -> SessionStatus {
        self.session_update.status
    }

    /// The number of errors counted so far.
    pub fn errors(&self) -> u64 {
        self.session_update.errors
    }
}

fn distinct_id(user: &User) -> Option<String> {
    user.id
        .as_ref()
        .or(user.email.as_ref())
        .or(user.username.as_ref())
        .cloned()
}
