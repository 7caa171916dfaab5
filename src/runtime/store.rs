//! The state container contract.
//!
//! The runtime never owns application state. It reaches the host's store
//! through two calls: `dispatch` for every emitted event, before sagas see it,
//! and `state` for `SELECT`.

use crate::error::SagaError;
use crate::types::{Event, Value};
use serde_json::Value as Json;

/// The host's state container.
pub trait Store {
    /// Applies an event. The result is what a resolving `PUT` resumes with.
    fn dispatch(&mut self, event: &Event) -> Result<Value, SagaError>;

    /// Returns the current state snapshot.
    fn state(&self) -> Json;
}

/// A store with no state that accepts every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStore;

impl Store for NullStore {
    fn dispatch(&mut self, event: &Event) -> Result<Value, SagaError> {
        Ok(Value::Event(event.clone()))
    }

    fn state(&self) -> Json {
        Json::Null
    }
}
