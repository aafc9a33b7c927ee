//! The envelope format used to ship payloads to the ingest endpoint.

use std::io::Write;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::v7 as protocol;

use crate::utils::{to_rfc3339, ts_rfc3339_opt};
use protocol::{Event, SessionUpdate};

/// Raised if a envelope cannot be parsed from a given input.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// Unexpected end of file
    #[error("unexpected end of file")]
    UnexpectedEof,
    /// Missing envelope header
    #[error("missing envelope header")]
    MissingHeader,
    /// Invalid envelope header
    #[error("invalid envelope header")]
    InvalidHeader(#[source] serde_json::Error),
    /// Invalid item header
    #[error("invalid item header")]
    InvalidItemHeader(#[source] serde_json::Error),
    /// Invalid item payload
    #[error("invalid item payload")]
    InvalidItemPayload(#[source] serde_json::Error),
    /// Writing the envelope failed
    #[error("failed to write envelope")]
    Write(#[source] std::io::Error),
}

#[derive(Deserialize)]
struct EnvelopeHeader {
    event_id: Option<Uuid>,
    #[serde(default, with = "ts_rfc3339_opt")]
    sent_at: Option<SystemTime>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum EnvelopeItemType {
    Event,
    Transaction,
    Session,
}

/// A sampling rate a payload went through before it was sent.
///
/// Listed in the item header so the server can extrapolate totals.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SampleRate {
    /// Identifies the stage that applied the rate, such as `client_rate`.
    pub id: String,
    /// The rate in the `0.0..=1.0` range.
    pub rate: f32,
}

#[derive(Deserialize)]
struct EnvelopeItemHeader {
    r#type: EnvelopeItemType,
    #[serde(default)]
    sample_rates: Vec<SampleRate>,
}

/// An Envelope Item.
#[derive(Clone, Debug, PartialEq)]
#[allow(clippy::large_enum_variant)]
pub enum EnvelopeItem {
    /// An error, message or transaction event.
    Event(Event),
    /// A session update.
    SessionUpdate(SessionUpdate),
}

impl EnvelopeItem {
    /// The value of the `type` field in the item header.
    pub fn item_type(&self) -> &'static str {
        match self {
            EnvelopeItem::Event(event) if event.is_transaction() => "transaction",
            EnvelopeItem::Event(_) => "event",
            EnvelopeItem::SessionUpdate(_) => "session",
        }
    }

    /// The data category this item is rate limited under.
    pub fn category(&self) -> &'static str {
        match self {
            EnvelopeItem::Event(event) if event.is_transaction() => "transaction",
            EnvelopeItem::Event(_) => "error",
            EnvelopeItem::SessionUpdate(_) => "session",
        }
    }
}

impl From<Event> for EnvelopeItem {
    fn from(event: Event) -> Self {
        EnvelopeItem::Event(event)
    }
}

impl From<SessionUpdate> for EnvelopeItem {
    fn from(session: SessionUpdate) -> Self {
        EnvelopeItem::SessionUpdate(session)
    }
}

/// The outbound unit handed to a transport.
///
/// Serialized as newline separated JSON: an envelope header with the event id
/// and `sent_at`, then for every item an item header followed by the payload.
/// The output has no trailing newline.
#[derive(Clone, Default, Debug, PartialEq)]
pub struct Envelope {
    event_id: Option<Uuid>,
    sent_at: Option<SystemTime>,
    sample_rates: Vec<SampleRate>,
    items: Vec<EnvelopeItem>,
}

impl Envelope {
    /// Creates a new empty Envelope.
    pub fn new() -> Envelope {
        Default::default()
    }

    /// Creates an envelope carrying a single event.
    pub fn from_event(event: Event) -> Envelope {
        Envelope::from(event)
    }

    /// Creates an envelope carrying a single session update.
    pub fn from_session(session: SessionUpdate) -> Envelope {
        Envelope::from(session)
    }

    /// Add a new Envelope Item.
    pub fn add_item<I>(&mut self, item: I)
    where
        I: Into<EnvelopeItem>,
    {
        let item = item.into();
        if self.event_id.is_none() {
            if let EnvelopeItem::Event(ref event) = item {
                self.event_id = event.event_id;
            }
        }
        self.items.push(item);
    }

    /// Records a sample rate applied to the event payload.
    pub fn add_sample_rate(&mut self, id: impl Into<String>, rate: f32) {
        self.sample_rates.push(SampleRate {
            id: id.into(),
            rate,
        });
    }

    /// The sample rates listed in the event item header.
    pub fn sample_rates(&self) -> &[SampleRate] {
        &self.sample_rates
    }

    /// Pins the `sent_at` header instead of stamping it on serialization.
    pub fn set_sent_at(&mut self, sent_at: SystemTime) {
        self.sent_at = Some(sent_at);
    }

    /// Iterates over all the [`EnvelopeItem`]s.
    pub fn items(&self) -> std::slice::Iter<'_, EnvelopeItem> {
        self.items.iter()
    }

    /// Returns the Envelopes Uuid, if any.
    pub fn uuid(&self) -> Option<&Uuid> {
        self.event_id.as_ref()
    }

    /// Returns the [`Event`] contained in this Envelope, if any.
    pub fn event(&self) -> Option<&Event> {
        self.items.iter().find_map(|item| match item {
            EnvelopeItem::Event(event) => Some(event),
            _ => None,
        })
    }

    /// Returns the [`SessionUpdate`] contained in this Envelope, if any.
    pub fn session(&self) -> Option<&SessionUpdate> {
        self.items.iter().find_map(|item| match item {
            EnvelopeItem::SessionUpdate(session) => Some(session),
            _ => None,
        })
    }

    /// The rate limit category of the first item, `default` when empty.
    pub fn category(&self) -> &'static str {
        self.items
            .first()
            .map(EnvelopeItem::category)
            .unwrap_or("default")
    }

    /// Serialize the Envelope into the given [`Write`].
    pub fn to_writer<W>(&self, mut writer: W) -> std::io::Result<()>
    where
        W: Write,
    {
        let sent_at = to_rfc3339(&self.sent_at.unwrap_or_else(SystemTime::now));
        match self.uuid() {
            Some(uuid) => write!(
                writer,
                r#"{{"event_id":"{}","sent_at":"{}"}}"#,
                uuid.as_simple(),
                sent_at
            )?,
            None => write!(writer, r#"{{"sent_at":"{}"}}"#, sent_at)?,
        }

        for item in &self.items {
            writeln!(writer)?;
            write!(writer, r#"{{"type":"{}""#, item.item_type())?;
            if matches!(item, EnvelopeItem::Event(_)) && !self.sample_rates.is_empty() {
                write!(writer, r#","sample_rates":"#)?;
                serde_json::to_writer(&mut writer, &self.sample_rates)?;
            }
            writeln!(writer, "}}")?;
            match item {
                EnvelopeItem::Event(event) => serde_json::to_writer(&mut writer, event)?,
                EnvelopeItem::SessionUpdate(session) => {
                    serde_json::to_writer(&mut writer, session)?
                }
            }
        }

        Ok(())
    }

    /// Serializes the Envelope into a fresh buffer.
    pub fn to_vec(&self) -> Result<Vec<u8>, EnvelopeError> {
        let mut buf = Vec::new();
        self.to_writer(&mut buf).map_err(EnvelopeError::Write)?;
        Ok(buf)
    }

    /// Creates a new Envelope from slice.
    pub fn from_slice(slice: &[u8]) -> Result<Envelope, EnvelopeError> {
        let mut lines = slice.split(|b| *b == b'\n');

        let header: EnvelopeHeader = match lines.next() {
            None => return Err(EnvelopeError::MissingHeader),
            Some(line) if line.is_empty() => return Err(EnvelopeError::MissingHeader),
            Some(line) => serde_json::from_slice(line).map_err(EnvelopeError::InvalidHeader)?,
        };

        let mut envelope = Envelope {
            event_id: header.event_id,
            sent_at: header.sent_at,
            ..Default::default()
        };

        while let Some(line) = lines.next() {
            if line.is_empty() {
                continue;
            }
            let item_header: EnvelopeItemHeader =
                serde_json::from_slice(line).map_err(EnvelopeError::InvalidItemHeader)?;
            let payload = lines.next().ok_or(EnvelopeError::UnexpectedEof)?;
            let item = match item_header.r#type {
                EnvelopeItemType::Event | EnvelopeItemType::Transaction => {
                    serde_json::from_slice(payload).map(EnvelopeItem::Event)
                }
                EnvelopeItemType::Session => {
                    serde_json::from_slice(payload).map(EnvelopeItem::SessionUpdate)
                }
            }
            .map_err(EnvelopeError::InvalidItemPayload)?;
            if !item_header.sample_rates.is_empty() {
                envelope.sample_rates = item_header.sample_rates;
            }
            envelope.add_item(item);
        }

        Ok(envelope)
    }
}

impl<T> From<T> for Envelope
where
    T: Into<EnvelopeItem>,
{
    fn from(item: T) -> Self {
        let mut envelope = Self::default();
        envelope.add_item(item.into());
        envelope
    }
}
