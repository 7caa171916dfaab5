//! Optional tracing integration.
//!
//! With the `tracing-integration` feature enabled these are the `tracing`
//! crate's macros. Without it they expand to nothing, so interpreter logging
//! costs nothing in builds that do not want it.
//!
//! ```ignore
//! use crate::tracing_compat::{debug, warn};
//!
//! debug!(task = %id, effect = effect.tag(), "effect triggered");
//! ```

#[cfg(feature = "tracing-integration")]
pub use tracing::{Level, debug, error, info, trace, warn};

#[cfg(not(feature = "tracing-integration"))]
mod noop {
    macro_rules! trace {
        ($($arg:tt)*) => {{}};
    }
    macro_rules! debug {
        ($($arg:tt)*) => {{}};
    }
    macro_rules! info {
        ($($arg:tt)*) => {{}};
    }
    macro_rules! warn {
        ($($arg:tt)*) => {{}};
    }
    macro_rules! error {
        ($($arg:tt)*) => {{}};
    }

    pub(crate) use {debug, error, info, trace, warn};
}

#[cfg(not(feature = "tracing-integration"))]
pub(crate) use noop::{debug, error, info, trace, warn};
