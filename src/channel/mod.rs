//! Channels for passing values between sagas.
//!
//! A [`Channel`] is a rendezvous point backed by a [`Buffer`]. Matching is
//! eager: a put goes straight to the oldest pending taker when one exists, and
//! a take is served from the buffer when it is non-empty, so a channel never
//! holds a buffered value and a pending taker at the same time.
//!
//! Channels are owned by whoever holds a handle; the runtime only registers
//! takers on them while a saga is blocked in `TAKE`.
//!
//! - [`buffer`]: overflow policies
//! - [`oneshot`]: single-value futures for resolving `CALL` effects from outside

pub mod buffer;
pub mod oneshot;

pub use buffer::{Buffer, BufferPolicy};

use crate::error::ChannelError;
use crate::tracing_compat::trace;
use crate::types::{ChannelId, Value};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

/// Identifies a pending taker so it can be withdrawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TakerId(u64);

type TakeCallback = Box<dyn FnOnce(Value)>;

struct Taker {
    id: TakerId,
    callback: TakeCallback,
}

struct ChannelState {
    buffer: Buffer<Value>,
    takers: VecDeque<Taker>,
    closed: bool,
    next_taker: u64,
}

/// A buffered channel of [`Value`]s.
///
/// Handles are cheap to clone and compare by identity.
#[derive(Clone)]
pub struct Channel {
    id: ChannelId,
    state: Rc<RefCell<ChannelState>>,
}

impl Channel {
    /// Creates a channel over the given buffer.
    #[must_use]
    pub fn new(buffer: Buffer<Value>) -> Self {
        Self {
            id: ChannelId::next(),
            state: Rc::new(RefCell::new(ChannelState {
                buffer,
                takers: VecDeque::new(),
                closed: false,
                next_taker: 0,
            })),
        }
    }

    /// Creates a channel with a buffer of the given policy.
    #[must_use]
    pub fn with_policy(policy: BufferPolicy) -> Self {
        Self::new(Buffer::new(policy))
    }

    /// Returns the channel id.
    #[must_use]
    pub const fn id(&self) -> ChannelId {
        self.id
    }

    /// Returns true once the channel is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.borrow().closed
    }

    /// Returns the number of buffered values.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.state.borrow().buffer.len()
    }

    /// Returns the number of pending takers.
    #[must_use]
    pub fn pending_takers(&self) -> usize {
        self.state.borrow().takers.len()
    }

    /// Puts a value.
    ///
    /// Putting [`Value::End`] closes the channel. Puts to a closed channel
    /// fail with [`ChannelError::Closed`]; a full fixed buffer fails with
    /// [`ChannelError::Overflow`].
    pub fn put(&self, value: Value) -> Result<(), ChannelError> {
        if value.is_end() {
            self.close();
            return Ok(());
        }
        let taker = {
            let mut state = self.state.borrow_mut();
            if state.closed {
                return Err(ChannelError::Closed);
            }
            match state.takers.pop_front() {
                Some(taker) => taker,
                None => {
                    trace!(channel = %self.id, "buffering put");
                    return state.buffer.put(value);
                }
            }
        };
        (taker.callback)(value);
        Ok(())
    }

    /// Takes the next value, if one can be delivered without waiting.
    ///
    /// Returns [`Value::End`] once the channel is closed and drained.
    #[must_use]
    pub fn poll_take(&self) -> Option<Value> {
        let mut state = self.state.borrow_mut();
        match state.buffer.take() {
            Some(value) => Some(value),
            None if state.closed => Some(Value::End),
            None => None,
        }
    }

    /// Takes the next value, invoking `callback` with it.
    ///
    /// The callback runs synchronously when a value (or the end marker) is
    /// available; otherwise it is queued and the returned id can withdraw it.
    pub fn take(&self, callback: impl FnOnce(Value) + 'static) -> Option<TakerId> {
        if let Some(value) = self.poll_take() {
            callback(value);
            return None;
        }
        let mut state = self.state.borrow_mut();
        let id = TakerId(state.next_taker);
        state.next_taker += 1;
        state.takers.push_back(Taker {
            id,
            callback: Box::new(callback),
        });
        Some(id)
    }

    /// Withdraws a pending taker. Returns false if it was already served.
    pub fn remove_taker(&self, id: TakerId) -> bool {
        let mut state = self.state.borrow_mut();
        let before = state.takers.len();
        state.takers.retain(|taker| taker.id != id);
        state.takers.len() != before
    }

    /// Closes the channel, delivering the end marker to every pending taker.
    ///
    /// Buffered values stay available to later takes.
    pub fn close(&self) {
        let takers: Vec<Taker> = {
            let mut state = self.state.borrow_mut();
            if state.closed {
                return;
            }
            state.closed = true;
            state.takers.drain(..).collect()
        };
        trace!(channel = %self.id, takers = takers.len(), "channel closed");
        for taker in takers {
            (taker.callback)(Value::End);
        }
    }

    /// Returns a value that was delivered to a taker which no longer wants it.
    ///
    /// The value goes to the next waiting taker, or back to the head of the
    /// buffer so the next take sees it first. A buffer with no room for it
    /// drops a value as its policy dictates.
    pub(crate) fn requeue(&self, value: Value) {
        let taker = {
            let mut state = self.state.borrow_mut();
            match state.takers.pop_front() {
                Some(taker) => taker,
                None => {
                    if state.buffer.restore(value).is_some() {
                        trace!(channel = %self.id, policy = ?state.buffer.policy(), "requeued value dropped");
                    }
                    return;
                }
            }
        };
        (taker.callback)(value);
    }

    /// Drains every buffered value without waiting.
    ///
    /// Returns [`Value::End`] if the channel is closed and already empty,
    /// otherwise a (possibly empty) list.
    #[must_use]
    pub fn flush(&self) -> Value {
        let mut state = self.state.borrow_mut();
        if state.closed && state.buffer.is_empty() {
            return Value::End;
        }
        Value::List(state.buffer.flush())
    }
}

impl Default for Channel {
    fn default() -> Self {
        Self::new(Buffer::expanding(10))
    }
}

impl PartialEq for Channel {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("buffered", &state.buffer.len())
            .field("takers", &state.takers.len())
            .field("closed", &state.closed)
            .finish()
    }
}
