//! Identifier types for runtime entities.
//!
//! Tasks and pending effects live in generational arenas; their ids wrap the
//! arena index so a stale id (a task that already settled, an effect that was
//! cancelled) can never address a newer occupant of the same slot.

use crate::util::ArenaIndex;
use core::fmt;
use serde::{Deserialize, Serialize};
use std::ops::Add;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) ArenaIndex);

        impl $name {
            #[inline]
            #[must_use]
            pub(crate) const fn from_arena(index: ArenaIndex) -> Self {
                Self(index)
            }

            #[inline]
            #[must_use]
            pub(crate) const fn arena_index(self) -> ArenaIndex {
                self.0
            }

            /// Creates an id for testing purposes.
            #[doc(hidden)]
            #[must_use]
            pub const fn new_for_test(index: u32, generation: u32) -> Self {
                Self(ArenaIndex::new(index, generation))
            }
        }

        impl fmt::Debug for $name {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(
                    f,
                    concat!(stringify!($name), "({}:{})"),
                    self.0.index(),
                    self.0.generation()
                )
            }
        }

        impl fmt::Display for $name {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0.index())
            }
        }
    };
}

arena_id!(
    /// A unique identifier for a task in the runtime.
    ///
    /// Tasks are created by root invocation, `FORK`/`SPAWN`, and by `CALL`
    /// effects whose function returns another saga.
    TaskId,
    "T"
);

arena_id!(
    /// Identifies one suspended effect: the yielded effect of a task, or a
    /// branch nested inside `RACE`/`ALL`.
    EffectId,
    "E"
);

/// Identifies a channel for logging and monitoring.
///
/// Channels are not owned by the runtime, so their ids come from a process
/// wide counter instead of an arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(u64);

impl ChannelId {
    /// Allocates the next channel id.
    #[must_use]
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw counter value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}", self.0)
    }
}

/// A logical timestamp on the runtime's virtual clock.
///
/// The clock only moves when the host advances it, which keeps timer-driven
/// combinators (delay, throttle, debounce, timeout) deterministic.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Time(u64);

impl Time {
    /// The zero instant.
    pub const ZERO: Self = Self(0);

    /// Creates a time from nanoseconds since the runtime started.
    #[inline]
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Creates a time from milliseconds since the runtime started.
    #[inline]
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    /// Returns the time as nanoseconds.
    #[inline]
    #[must_use]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Returns the time as milliseconds (truncated).
    #[inline]
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0 / 1_000_000
    }

    /// Returns the elapsed duration since `earlier`, or zero.
    #[inline]
    #[must_use]
    pub const fn duration_since(self, earlier: Self) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }
}

impl Add<Duration> for Time {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Duration) -> Self::Output {
        let nanos: u64 = rhs.as_nanos().min(u128::from(u64::MAX)) as u64;
        Self(self.0.saturating_add(nanos))
    }
}

impl fmt::Debug for Time {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Time({}ns)", self.0)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 >= 1_000_000_000 {
            write!(f, "{}.{:03}s", self.0 / 1_000_000_000, (self.0 / 1_000_000) % 1000)
        } else {
            write!(f, "{}ms", self.0 / 1_000_000)
        }
    }
}
