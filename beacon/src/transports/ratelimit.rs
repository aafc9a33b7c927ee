use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use httpdate::parse_http_date;

/// The category every rate limit without explicit categories applies to.
pub const ALL_CATEGORIES: &str = "all";

const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// A Utility that helps with rate limiting ingest requests.
///
/// Limits are stored per category as the absolute time until which the
/// category is disabled.  The [`ALL_CATEGORIES`] entry applies to every
/// category that has no entry of its own.
#[derive(Clone, Debug, Default)]
pub struct RateLimiter {
    limits: HashMap<String, SystemTime>,
}

impl RateLimiter {
    /// Create a new RateLimiter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the time until which `category` is disabled, if any limit
    /// was ever recorded for it.
    ///
    /// A limit recorded for the category itself takes precedence over the
    /// wildcard limit.
    pub fn disabled_until(&self, category: &str) -> Option<SystemTime> {
        self.limits
            .get(category)
            .or_else(|| self.limits.get(ALL_CATEGORIES))
            .copied()
    }

    /// Returns the retry time if `category` is still disabled at `now`.
    pub fn is_disabled(&self, category: &str, now: SystemTime) -> Option<SystemTime> {
        self.disabled_until(category)
            .filter(|disabled_until| now < *disabled_until)
    }

    /// Updates the RateLimiter with information from a `Retry-After` header.
    ///
    /// The header holds either a number of seconds or an HTTP date.  Only
    /// the leading integer part of a number counts.  Anything else disables
    /// all categories for 60 seconds.
    pub fn update_from_retry_after(&mut self, header: &str, now: SystemTime) {
        let header = header.trim();
        let disabled_until = if let Some(retry_after) = parse_seconds(header) {
            now + retry_after
        } else if let Ok(date) = parse_http_date(header) {
            date
        } else {
            now + DEFAULT_RETRY_AFTER
        };
        self.limits.insert(ALL_CATEGORIES.into(), disabled_until);
    }

    /// Updates the RateLimiter with information from a `X-Sentry-Rate-Limits` header.
    pub fn update_from_rate_limits_header(&mut self, header: &str, now: SystemTime) {
        // <rate-limit> = (<group>,)+
        // <group> = <time>:(<category>;)*(:<scope>(:<reason>)?)?
        for group in header.trim().split(',') {
            let group = group.trim();
            if group.is_empty() {
                continue;
            }

            let mut splits = group.split(':');
            let retry_after = splits
                .next()
                .and_then(parse_seconds)
                .unwrap_or(DEFAULT_RETRY_AFTER);
            let disabled_until = now + retry_after;

            let categories = splits.next().unwrap_or_default().trim();
            if categories.is_empty() {
                self.limits.insert(ALL_CATEGORIES.into(), disabled_until);
                continue;
            }
            for category in categories.split(';').filter(|c| !c.is_empty()) {
                self.limits.insert(category.to_owned(), disabled_until);
            }
        }
    }
}

/// Reads the leading integer of `value` as seconds, ignoring any trailing
/// text.  Negative delays are clamped to zero.
fn parse_seconds(value: &str) -> Option<Duration> {
    let value = value.trim_start();
    let (negative, rest) = match value.as_bytes().first() {
        Some(b'-') => (true, &value[1..]),
        Some(b'+') => (false, &value[1..]),
        _ => (false, value),
    };
    let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    if negative {
        return Some(Duration::ZERO);
    }
    let seconds = rest[..digits]
        .bytes()
        .fold(0u64, |acc, digit| {
            acc.saturating_mul(10).saturating_add(u64::from(digit - b'0'))
        });
    Some(Duration::from_secs(seconds))
}
