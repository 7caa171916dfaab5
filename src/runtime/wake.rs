//! Wakeup plumbing for pending effects.
//!
//! Futures returned from `CALL` are polled with a waker that pushes the
//! effect id onto a lock-free queue; the run loop drains it. The queue is
//! shared through an `Arc` because `Waker` must be `Send + Sync`, even though
//! the runtime itself is single-threaded.

use crate::types::EffectId;
use crossbeam_queue::SegQueue;
use std::sync::Arc;
use std::task::{Wake, Waker};

/// Effects whose futures asked to be polled again.
#[derive(Debug, Default)]
pub struct WakeQueue {
    inner: SegQueue<EffectId>,
}

impl WakeQueue {
    /// Creates a new queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: SegQueue::new(),
        }
    }

    /// Pushes an effect.
    pub fn push(&self, effect: EffectId) {
        self.inner.push(effect);
    }

    /// Pops the oldest woken effect.
    pub fn pop(&self) -> Option<EffectId> {
        self.inner.pop()
    }

    /// Returns the number of queued wakeups.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

struct EffectWaker {
    effect: EffectId,
    queue: Arc<WakeQueue>,
}

impl Wake for EffectWaker {
    fn wake(self: Arc<Self>) {
        self.queue.push(self.effect);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.queue.push(self.effect);
    }
}

/// Builds a waker that re-queues `effect` when woken.
pub fn effect_waker(queue: &Arc<WakeQueue>, effect: EffectId) -> Waker {
    Waker::from(Arc::new(EffectWaker {
        effect,
        queue: Arc::clone(queue),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waking_queues_the_effect() {
        let queue = Arc::new(WakeQueue::new());
        let waker = effect_waker(&queue, EffectId::new_for_test(2, 1));
        waker.wake_by_ref();
        waker.wake();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop(), Some(EffectId::new_for_test(2, 1)));
        assert_eq!(queue.pop(), Some(EffectId::new_for_test(2, 1)));
        assert!(queue.is_empty());
    }
}
