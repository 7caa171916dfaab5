//! Values exchanged between sagas and the interpreter.
//!
//! Sagas are resumed with heterogeneous results: dispatched events, task
//! handles from `FORK`, channels from `ACTION_CHANNEL`, race records, plain
//! data returned by invoked functions, and the end-of-stream marker. [`Value`]
//! is the closed set of those shapes; plain data is carried as JSON.

use crate::channel::Channel;
use crate::runtime::Task;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::BTreeMap;
use std::fmt;

/// An event (action) flowing through the event bus.
///
/// Events are matched by their `tag` (serialized as `type`, matching the
/// conventional action shape).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// The event's type tag.
    #[serde(rename = "type")]
    pub tag: String,
    /// Arbitrary payload.
    #[serde(default, skip_serializing_if = "Json::is_null")]
    pub payload: Json,
}

impl Event {
    /// Creates an event with no payload.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            payload: Json::Null,
        }
    }

    /// Creates an event carrying `payload`.
    pub fn with_payload(tag: impl Into<String>, payload: Json) -> Self {
        Self {
            tag: tag.into(),
            payload,
        }
    }

    /// Returns the tag.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.payload.is_null() {
            write!(f, "{}", self.tag)
        } else {
            write!(f, "{}({})", self.tag, self.payload)
        }
    }
}

/// A value a saga is resumed with, or returns.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    /// No value.
    #[default]
    Unit,
    /// Plain data.
    Data(Json),
    /// A dispatched event.
    Event(Event),
    /// A task handle.
    Task(Task),
    /// A channel handle.
    Channel(Channel),
    /// Ordered results (`ALL`, multi-`JOIN`, `FLUSH`).
    List(Vec<Value>),
    /// Keyed results; a `RACE` resumes with a single-key record.
    Record(BTreeMap<String, Value>),
    /// End-of-stream marker delivered by closed channels.
    End,
}

impl Value {
    /// Returns a short name for the variant, used in diagnostics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Unit => "unit",
            Self::Data(_) => "data",
            Self::Event(_) => "event",
            Self::Task(_) => "task",
            Self::Channel(_) => "channel",
            Self::List(_) => "list",
            Self::Record(_) => "record",
            Self::End => "end",
        }
    }

    /// Returns true for the end-of-stream marker.
    #[must_use]
    pub const fn is_end(&self) -> bool {
        matches!(self, Self::End)
    }

    /// Returns the JSON payload of a data value.
    #[must_use]
    pub fn as_data(&self) -> Option<&Json> {
        match self {
            Self::Data(json) => Some(json),
            _ => None,
        }
    }

    /// Returns the boolean held by a data value.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        self.as_data().and_then(Json::as_bool)
    }

    /// Returns the integer held by a data value.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        self.as_data().and_then(Json::as_i64)
    }

    /// Returns the string held by a data value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.as_data().and_then(Json::as_str)
    }

    /// Returns the event, if this is one.
    #[must_use]
    pub fn as_event(&self) -> Option<&Event> {
        match self {
            Self::Event(event) => Some(event),
            _ => None,
        }
    }

    /// Returns the task handle, if this is one.
    #[must_use]
    pub fn as_task(&self) -> Option<&Task> {
        match self {
            Self::Task(task) => Some(task),
            _ => None,
        }
    }

    /// Consumes the value, returning the task handle if it is one.
    #[must_use]
    pub fn into_task(self) -> Option<Task> {
        match self {
            Self::Task(task) => Some(task),
            _ => None,
        }
    }

    /// Returns the channel handle, if this is one.
    #[must_use]
    pub fn as_channel(&self) -> Option<&Channel> {
        match self {
            Self::Channel(channel) => Some(channel),
            _ => None,
        }
    }

    /// Returns the list items, if this is a list.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the record entries, if this is a record.
    #[must_use]
    pub fn as_record(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Record(entries) => Some(entries),
            _ => None,
        }
    }

    /// Splits a single-key record (a `RACE` result) into name and value.
    #[must_use]
    pub fn into_winner(self) -> Option<(String, Value)> {
        match self {
            Self::Record(entries) if entries.len() == 1 => entries.into_iter().next(),
            _ => None,
        }
    }

    /// Builds a single-key record.
    pub fn keyed(key: impl Into<String>, value: Value) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(key.into(), value);
        Self::Record(entries)
    }
}

impl From<Json> for Value {
    fn from(json: Json) -> Self {
        Self::Data(json)
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Self::Unit
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Data(Json::Bool(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Data(Json::from(v))
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Data(Json::from(v))
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::Data(Json::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Data(Json::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Data(Json::from(v))
    }
}

impl From<Event> for Value {
    fn from(event: Event) -> Self {
        Self::Event(event)
    }
}

impl From<Task> for Value {
    fn from(task: Task) -> Self {
        Self::Task(task)
    }
}

impl From<Channel> for Value {
    fn from(channel: Channel) -> Self {
        Self::Channel(channel)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}
