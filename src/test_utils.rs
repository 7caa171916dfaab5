//! Test helpers: logging setup, phase markers and a recording store.
//!
//! Every unit test follows the same shape:
//!
//! ```ignore
//! fn init_test(name: &str) {
//!     crate::test_utils::init_test_logging();
//!     crate::test_phase!(name);
//! }
//!
//! #[test]
//! fn something() {
//!     init_test("something");
//!     crate::assert_with_log!(x == 1, "x is one", 1, x);
//!     crate::test_complete!("something");
//! }
//! ```
//!
//! Logging honours `RUST_LOG`; without it, the crate logs at `debug`.

use crate::error::SagaError;
use crate::runtime::Store;
use crate::types::{Event, Value};
use serde_json::Value as Json;
use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;
use std::sync::Once;

static INIT: Once = Once::new();

/// Installs a test subscriber once per process.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("sagasync=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(false)
            .try_init();
    });
}

#[doc(hidden)]
pub fn log_phase(name: &str) {
    tracing::info!("==== {name} ====");
}

#[doc(hidden)]
pub fn log_section(name: &str) {
    tracing::info!("---- {name} ----");
}

#[doc(hidden)]
pub fn log_complete(name: &str) {
    tracing::info!("==== {name}: complete ====");
}

#[doc(hidden)]
pub fn log_assert(passed: bool, message: &str, expected: &dyn Debug, actual: &dyn Debug) {
    if passed {
        tracing::debug!(expected = ?expected, actual = ?actual, "ok: {message}");
    } else {
        tracing::error!(expected = ?expected, actual = ?actual, "FAILED: {message}");
    }
}

/// Marks the start of a test.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        $crate::test_utils::log_phase($name)
    };
}

/// Marks a section inside a test.
#[macro_export]
macro_rules! test_section {
    ($name:expr) => {
        $crate::test_utils::log_section($name)
    };
}

/// Marks the successful end of a test.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        $crate::test_utils::log_complete($name)
    };
}

/// Asserts a condition, logging expected and actual values either way.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr $(,)?) => {{
        let passed: bool = $cond;
        $crate::test_utils::log_assert(passed, $msg, &$expected, &$actual);
        assert!(
            passed,
            "{}: expected {:?}, got {:?}",
            $msg, $expected, $actual
        );
    }};
}

type Reducer = Box<dyn FnMut(&mut Json, &Event)>;

/// A [`Store`] that records every dispatched event.
///
/// The log handle stays readable after the store is moved into a runtime.
pub struct RecordingStore {
    state: Json,
    reducer: Option<Reducer>,
    log: Rc<RefCell<Vec<Event>>>,
}

impl RecordingStore {
    /// Creates a store with the given initial state.
    #[must_use]
    pub fn new(state: Json) -> Self {
        Self {
            state,
            reducer: None,
            log: Rc::default(),
        }
    }

    /// Applies `reducer` to the state on every dispatch.
    #[must_use]
    pub fn with_reducer(mut self, reducer: impl FnMut(&mut Json, &Event) + 'static) -> Self {
        self.reducer = Some(Box::new(reducer));
        self
    }

    /// Returns a shared handle to the dispatch log.
    #[must_use]
    pub fn log(&self) -> Rc<RefCell<Vec<Event>>> {
        Rc::clone(&self.log)
    }
}

impl Default for RecordingStore {
    fn default() -> Self {
        Self::new(Json::Null)
    }
}

impl Store for RecordingStore {
    fn dispatch(&mut self, event: &Event) -> Result<Value, SagaError> {
        if let Some(reducer) = self.reducer.as_mut() {
            reducer(&mut self.state, event);
        }
        self.log.borrow_mut().push(event.clone());
        Ok(Value::Event(event.clone()))
    }

    fn state(&self) -> Json {
        self.state.clone()
    }
}

/// Returns the tags of every event in a dispatch log.
#[must_use]
pub fn tags(log: &Rc<RefCell<Vec<Event>>>) -> Vec<String> {
    log.borrow().iter().map(|event| event.tag.clone()).collect()
}
