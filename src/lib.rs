//! Sagasync: a cancel-correct interpreter for effect-yielding sagas.
//!
//! # Overview
//!
//! A saga is a long-lived coroutine that never performs side effects itself.
//! It yields [`Effect`] descriptions (wait for an event, dispatch an event,
//! call a function, fork a child, race alternatives) and the [`Runtime`]
//! interprets them, resuming the saga with each result. Sagas sit next to a
//! [`Store`] and see every event it receives.
//!
//! # Core Guarantees
//!
//! - **No orphan tasks**: an attached child keeps its parent alive; a parent settles only after its children
//! - **Fail fast**: a child error cancels its siblings and surfaces in the parent
//! - **Cancellation is a protocol**: a cancelled task's pending effect is torn down and its cleanup still runs
//! - **Every effect settles once**: late results for cancelled effects are discarded
//! - **Deterministic**: single-threaded run loop with a virtual clock
//!
//! # Module Structure
//!
//! - [`types`]: Identifiers, values, events, outcomes and cancel reasons
//! - [`error`](mod@error): Error types
//! - [`pattern`]: Event matching
//! - [`channel`]: Buffers and point-to-point channels
//! - [`effect`]: Effect descriptions and their constructors
//! - [`saga`]: The saga protocol and the async adapter
//! - [`runtime`]: The run loop, task tree and effect interpreter
//! - [`combinator`]: Watchers, throttling, timeouts and retries
//! - [`config`]: Runtime configuration
//! - [`util`]: Internal utilities (generational arena)
//! - [`tracing_compat`]: Optional tracing integration (requires `tracing-integration` feature)
//!
//! # Example
//!
//! ```ignore
//! use sagasync::{Runtime, effect, saga};
//!
//! let mut runtime = Runtime::default();
//! let task = runtime.run_async("login", |co| async move {
//!     let request = co.effect(effect::take("LOGIN_REQUEST")).await?;
//!     co.effect(effect::put_event("LOGIN_SUCCESS")).await?;
//!     Ok(request)
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(dead_code)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_inception)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]

pub mod channel;
pub mod combinator;
pub mod config;
pub mod effect;
pub mod error;
pub mod pattern;
pub mod runtime;
pub mod saga;
pub mod tracing_compat;
pub mod types;
pub mod util;

// ── Test-only modules ───────────────────────────────────────────────────
#[cfg(any(test, feature = "test-internals"))]
pub mod test_utils;

// Re-exports for convenient access to core types
pub use channel::{Buffer, BufferPolicy, Channel};
pub use config::{ConfigError, RuntimeConfig};
pub use effect::{CallOutcome, Callable, Effect};
pub use error::{ChannelError, EffectError, Result, SagaError, TaskError};
pub use pattern::Pattern;
pub use runtime::{Runtime, RuntimeBuilder, RuntimeStats, SagaMonitor, Store, Task};
pub use saga::{Co, Resume, Saga, Step};
pub use types::{CancelKind, CancelReason, Event, TaskId, TaskOutcome, TaskStatus, Value};
