//! FIFO buffers with overflow policies.
//!
//! A buffer only holds values nobody is waiting for: channels hand values to
//! pending takers directly, so [`Buffer::put`] is reached only when the taker
//! queue is empty.

use crate::error::ChannelError;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// What a buffer does with values beyond its capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "policy", content = "capacity", rename_all = "snake_case")]
pub enum BufferPolicy {
    /// Holds nothing; values with no waiting taker are dropped.
    None,
    /// Holds up to `n` values; further puts fail with an overflow error.
    Fixed(usize),
    /// Holds up to `n` values; further puts are silently dropped.
    Dropping(usize),
    /// Holds up to `n` values; further puts evict the oldest value.
    Sliding(usize),
    /// Starts with room for `n` values and grows as needed.
    Expanding(usize),
    /// Grows without limit.
    Unbounded,
}

impl BufferPolicy {
    /// Returns the capacity limit, or `None` for growable policies.
    #[must_use]
    pub const fn limit(self) -> Option<usize> {
        match self {
            Self::None => Some(0),
            Self::Fixed(n) | Self::Dropping(n) | Self::Sliding(n) => Some(n),
            Self::Expanding(_) | Self::Unbounded => None,
        }
    }
}

impl Default for BufferPolicy {
    fn default() -> Self {
        Self::Fixed(10)
    }
}

/// A FIFO queue governed by a [`BufferPolicy`].
#[derive(Debug, Clone)]
pub struct Buffer<T> {
    policy: BufferPolicy,
    items: VecDeque<T>,
}

impl<T> Buffer<T> {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new(policy: BufferPolicy) -> Self {
        let items = match policy {
            BufferPolicy::Fixed(n)
            | BufferPolicy::Dropping(n)
            | BufferPolicy::Sliding(n)
            | BufferPolicy::Expanding(n) => VecDeque::with_capacity(n),
            BufferPolicy::None | BufferPolicy::Unbounded => VecDeque::new(),
        };
        Self { policy, items }
    }

    /// A buffer that never holds values.
    #[must_use]
    pub fn none() -> Self {
        Self::new(BufferPolicy::None)
    }

    /// A buffer of `n` values that rejects overflow.
    #[must_use]
    pub fn fixed(n: usize) -> Self {
        Self::new(BufferPolicy::Fixed(n))
    }

    /// A buffer of `n` values that drops the newest on overflow.
    #[must_use]
    pub fn dropping(n: usize) -> Self {
        Self::new(BufferPolicy::Dropping(n))
    }

    /// A buffer of `n` values that evicts the oldest on overflow.
    #[must_use]
    pub fn sliding(n: usize) -> Self {
        Self::new(BufferPolicy::Sliding(n))
    }

    /// A growable buffer with an initial capacity of `n`.
    #[must_use]
    pub fn expanding(n: usize) -> Self {
        Self::new(BufferPolicy::Expanding(n))
    }

    /// A growable buffer.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::new(BufferPolicy::Unbounded)
    }

    /// Returns the policy.
    #[must_use]
    pub const fn policy(&self) -> BufferPolicy {
        self.policy
    }

    /// Returns the number of buffered values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Buffers a value according to the policy.
    pub fn put(&mut self, item: T) -> Result<(), ChannelError> {
        match self.policy {
            BufferPolicy::None => {}
            BufferPolicy::Fixed(n) => {
                if self.items.len() >= n {
                    return Err(ChannelError::Overflow(n));
                }
                self.items.push_back(item);
            }
            BufferPolicy::Dropping(n) => {
                if self.items.len() < n {
                    self.items.push_back(item);
                }
            }
            BufferPolicy::Sliding(n) => {
                if n == 0 {
                    return Ok(());
                }
                if self.items.len() >= n {
                    self.items.pop_front();
                }
                self.items.push_back(item);
            }
            BufferPolicy::Expanding(_) | BufferPolicy::Unbounded => self.items.push_back(item),
        }
        Ok(())
    }

    /// Removes the oldest value.
    pub fn take(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    /// Puts a value back at the head of the queue.
    ///
    /// The value is older than anything buffered, so the policy decides which
    /// end gives way when full: `Dropping` evicts the newest value, the other
    /// bounded policies keep what they hold and return `item`.
    pub(crate) fn restore(&mut self, item: T) -> Option<T> {
        match self.policy {
            BufferPolicy::None => Some(item),
            BufferPolicy::Fixed(n) | BufferPolicy::Sliding(n) => {
                if self.items.len() >= n {
                    return Some(item);
                }
                self.items.push_front(item);
                None
            }
            BufferPolicy::Dropping(n) => {
                if n == 0 {
                    return Some(item);
                }
                self.items.push_front(item);
                if self.items.len() > n {
                    self.items.pop_back()
                } else {
                    None
                }
            }
            BufferPolicy::Expanding(_) | BufferPolicy::Unbounded => {
                self.items.push_front(item);
                None
            }
        }
    }

    /// Removes every buffered value, oldest first.
    pub fn flush(&mut self) -> Vec<T> {
        self.items.drain(..).collect()
    }
}

impl<T> Default for Buffer<T> {
    fn default() -> Self {
        Self::new(BufferPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn fixed_rejects_overflow() {
        let mut buffer = Buffer::fixed(2);
        buffer.put(1).unwrap();
        buffer.put(2).unwrap();
        assert_eq!(buffer.put(3), Err(ChannelError::Overflow(2)));
        assert_eq!(buffer.flush(), vec![1, 2]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn dropping_keeps_oldest_and_sliding_keeps_newest() {
        let mut dropping = Buffer::dropping(2);
        let mut sliding = Buffer::sliding(2);
        for i in 1..=4 {
            dropping.put(i).unwrap();
            sliding.put(i).unwrap();
        }
        assert_eq!(dropping.flush(), vec![1, 2]);
        assert_eq!(sliding.flush(), vec![3, 4]);
    }

    #[test]
    fn none_holds_nothing() {
        let mut buffer = Buffer::none();
        buffer.put("x").unwrap();
        assert_eq!(buffer.take(), None);
        assert_eq!(BufferPolicy::None.limit(), Some(0));
    }

    #[test]
    fn expanding_grows_past_initial_capacity() {
        let mut buffer = Buffer::expanding(1);
        for i in 0..5 {
            buffer.put(i).unwrap();
        }
        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.take(), Some(0));
    }

    #[test]
    fn restore_follows_the_policy() {
        let mut none = Buffer::none();
        assert_eq!(none.restore(1), Some(1));
        assert!(none.is_empty());

        let mut fixed = Buffer::fixed(1);
        fixed.put(2).unwrap();
        assert_eq!(fixed.restore(1), Some(1));
        assert_eq!(fixed.flush(), vec![2]);
        assert_eq!(fixed.restore(1), None);
        assert_eq!(fixed.flush(), vec![1]);

        let mut dropping = Buffer::dropping(2);
        dropping.put(2).unwrap();
        dropping.put(3).unwrap();
        assert_eq!(dropping.restore(1), Some(3));
        assert_eq!(dropping.flush(), vec![1, 2]);

        let mut sliding = Buffer::sliding(1);
        sliding.put(2).unwrap();
        assert_eq!(sliding.restore(1), Some(1));
        assert_eq!(sliding.flush(), vec![2]);

        let mut unbounded = Buffer::unbounded();
        unbounded.put(2).unwrap();
        assert_eq!(unbounded.restore(1), None);
        assert_eq!(unbounded.flush(), vec![1, 2]);
    }

    #[test]
    fn policy_serializes_with_capacity() {
        let json = serde_json::to_value(BufferPolicy::Sliding(4)).unwrap();
        assert_eq!(json, serde_json::json!({"policy": "sliding", "capacity": 4}));
        let back: BufferPolicy = serde_json::from_value(json).unwrap();
        assert_eq!(back, BufferPolicy::Sliding(4));
        let unbounded: BufferPolicy =
            serde_json::from_value(serde_json::json!({"policy": "unbounded"})).unwrap();
        assert_eq!(unbounded, BufferPolicy::Unbounded);
    }

    proptest! {
        #[test]
        fn bounded_policies_respect_limit(cap in 0usize..6, puts in proptest::collection::vec(0u8..100, 0..20)) {
            for policy in [BufferPolicy::Fixed(cap), BufferPolicy::Dropping(cap), BufferPolicy::Sliding(cap)] {
                let mut buffer = Buffer::new(policy);
                for value in &puts {
                    let _ = buffer.put(*value);
                    prop_assert!(buffer.len() <= cap);
                    if value % 3 == 0 {
                        let _ = buffer.restore(*value);
                        prop_assert!(buffer.len() <= cap);
                    }
                }
            }
        }

        #[test]
        fn sliding_keeps_the_last_values(cap in 1usize..6, puts in proptest::collection::vec(0u8..100, 0..20)) {
            let mut buffer = Buffer::sliding(cap);
            for value in &puts {
                buffer.put(*value).unwrap();
            }
            let skip = puts.len().saturating_sub(cap);
            prop_assert_eq!(buffer.flush(), puts[skip..].to_vec());
        }
    }
}
