//! Core types for the saga runtime.
//!
//! - [`id`]: Identifier types (`TaskId`, `EffectId`, `ChannelId`, `Time`)
//! - [`cancel`]: Cancellation reason and kind types
//! - [`value`]: Values and events exchanged with sagas
//! - [`outcome`]: Task status and settled outcomes

pub mod cancel;
pub mod id;
pub mod outcome;
pub mod value;

pub use cancel::{CancelKind, CancelReason};
pub use id::{ChannelId, EffectId, TaskId, Time};
pub use outcome::{TaskOutcome, TaskStatus};
pub use value::{Event, Value};
