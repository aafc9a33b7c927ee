//! Useful utilities for working with events.

use crate::protocol::{Context, Event, Map, Value};

/// Parse the types name from `Debug` output.
///
/// # Examples
///
/// ```
/// use beacon_core::utils::parse_type_from_debug;
///
/// let err = "NaN".parse::<usize>().unwrap_err();
/// assert_eq!(&parse_type_from_debug(&err), "ParseIntError");
/// ```
pub fn parse_type_from_debug<D: std::fmt::Debug + ?Sized>(d: &D) -> String {
    let dbg = format!("{:#?}", d);

    dbg.split(&[' ', '(', '{', '\r', '\n'][..])
        .next()
        .unwrap_or(&dbg)
        .trim()
        .to_owned()
}

/// Truncates `value` to `max_length` characters, appending `...` if cut.
///
/// # Examples
///
/// ```
/// use beacon_core::utils::truncate;
///
/// assert_eq!(truncate("abcdef", 3), "abc...");
/// assert_eq!(truncate("abc", 3), "abc");
/// ```
pub fn truncate(value: &str, max_length: usize) -> String {
    match value.char_indices().nth(max_length) {
        Some((end, _)) => format!("{}...", &value[..end]),
        None => value.to_owned(),
    }
}

/// Limits the nesting of a JSON value.
///
/// Objects and arrays found at depth `0` are replaced with the `"[Object]"`
/// and `"[Array]"` placeholders.
pub fn normalize_value(value: &mut Value, depth: usize) {
    match value {
        Value::Object(_) if depth == 0 => *value = Value::String("[Object]".into()),
        Value::Array(_) if depth == 0 => *value = Value::String("[Array]".into()),
        Value::Object(map) => {
            for item in map.values_mut() {
                normalize_value(item, depth - 1);
            }
        }
        Value::Array(items) => {
            for item in items {
                normalize_value(item, depth - 1);
            }
        }
        _ => {}
    }
}

/// Normalizes the values of a map that itself sits at `depth`.
pub fn normalize_map(map: &mut Map<String, Value>, depth: usize) {
    for value in map.values_mut() {
        normalize_value(value, depth.saturating_sub(1));
    }
}

/// Normalizes the free-form parts of an event to `depth`.
///
/// Covers breadcrumb data, additional user fields, contexts and extra.  The
/// trace context is left untouched.
pub(crate) fn normalize_event(event: &mut Event, depth: usize) {
    for breadcrumb in event.breadcrumbs.iter_mut() {
        normalize_map(&mut breadcrumb.data, depth);
    }
    if let Some(user) = event.user.as_mut() {
        normalize_map(&mut user.other, depth);
    }
    for (key, context) in event.contexts.iter_mut() {
        if key == "trace" {
            continue;
        }
        if let Context::Other(map) = context {
            normalize_map(map, depth.saturating_sub(1));
        }
    }
    normalize_map(&mut event.extra, depth);
}
