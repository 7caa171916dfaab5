//! The ambient event bus.
//!
//! Two kinds of listeners: takers (sagas blocked in a pattern `TAKE`, served
//! at most once and in registration order) and subscribed action channels
//! (fed every matching event until they close).

use crate::channel::Channel;
use crate::pattern::Matcher;
use crate::tracing_compat::warn;
use crate::types::{EffectId, Event, Value};

#[derive(Debug)]
struct BusTaker {
    effect: EffectId,
    matcher: Matcher,
    maybe: bool,
}

#[derive(Debug)]
struct Subscriber {
    matcher: Matcher,
    channel: Channel,
}

/// Listener registry for dispatched events.
#[derive(Debug, Default)]
pub struct EventBus {
    takers: Vec<BusTaker>,
    subscribers: Vec<Subscriber>,
    closed: bool,
}

impl EventBus {
    /// Creates an open bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true once the bus has been ended.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Returns the number of blocked takers.
    #[must_use]
    pub fn taker_count(&self) -> usize {
        self.takers.len()
    }

    /// Returns the number of live action channels.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Registers a taker for the next matching event.
    pub fn add_taker(&mut self, effect: EffectId, matcher: Matcher, maybe: bool) {
        self.takers.push(BusTaker {
            effect,
            matcher,
            maybe,
        });
    }

    /// Withdraws a taker. Returns false if it was not registered.
    pub fn remove_taker(&mut self, effect: EffectId) -> bool {
        let before = self.takers.len();
        self.takers.retain(|taker| taker.effect != effect);
        before != self.takers.len()
    }

    /// Removes and returns every taker matching `event`, oldest first.
    ///
    /// Takers registered while these are being served wait for the next
    /// event.
    pub fn take_matching(&mut self, event: &Event) -> Vec<EffectId> {
        let mut matched = Vec::new();
        self.takers.retain(|taker| {
            if taker.matcher.matches(event) {
                matched.push(taker.effect);
                false
            } else {
                true
            }
        });
        matched
    }

    /// Feeds every event matching `matcher` into `channel`.
    pub fn subscribe(&mut self, matcher: Matcher, channel: Channel) {
        self.subscribers.push(Subscriber { matcher, channel });
    }

    /// Puts `event` into every matching action channel.
    ///
    /// Closed channels are dropped from the registry. A full fixed buffer
    /// loses the event.
    pub fn publish(&mut self, event: &Event) {
        self.subscribers.retain(|sub| !sub.channel.is_closed());
        let targets: Vec<Channel> = self
            .subscribers
            .iter()
            .filter(|sub| sub.matcher.matches(event))
            .map(|sub| sub.channel.clone())
            .collect();
        for channel in targets {
            if let Err(err) = channel.put(Value::Event(event.clone())) {
                warn!(channel = %channel.id(), event = %event, error = %err, "action channel dropped event");
            }
        }
    }

    /// Ends the bus: closes every action channel and returns the blocked
    /// takers with their `maybe` flags.
    pub fn close(&mut self) -> Vec<(EffectId, bool)> {
        self.closed = true;
        for sub in self.subscribers.drain(..) {
            sub.channel.close();
        }
        self.takers
            .drain(..)
            .map(|taker| (taker.effect, taker.maybe))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Pattern;

    fn effect(n: u32) -> EffectId {
        EffectId::new_for_test(n, 1)
    }

    #[test]
    fn matching_takers_are_served_once_in_order() {
        let mut bus = EventBus::new();
        bus.add_taker(effect(1), Pattern::from("A").compile(), false);
        bus.add_taker(effect(2), Pattern::from("B").compile(), false);
        bus.add_taker(effect(3), Pattern::Any.compile(), false);

        let served = bus.take_matching(&Event::new("A"));
        assert_eq!(served, vec![effect(1), effect(3)]);
        assert_eq!(bus.taker_count(), 1);
        assert!(bus.take_matching(&Event::new("A")).is_empty());
    }

    #[test]
    fn removed_taker_is_not_served() {
        let mut bus = EventBus::new();
        bus.add_taker(effect(1), Pattern::Any.compile(), true);
        assert!(bus.remove_taker(effect(1)));
        assert!(!bus.remove_taker(effect(1)));
        assert!(bus.take_matching(&Event::new("X")).is_empty());
    }

    #[test]
    fn subscribers_receive_matches_until_closed() {
        let mut bus = EventBus::new();
        let channel = Channel::default();
        bus.subscribe(Pattern::from("A").compile(), channel.clone());
        bus.publish(&Event::new("A"));
        bus.publish(&Event::new("B"));
        assert_eq!(channel.buffered(), 1);

        bus.add_taker(effect(4), Pattern::Any.compile(), true);
        let ended = bus.close();
        assert_eq!(ended, vec![(effect(4), true)]);
        assert!(bus.is_closed());
        assert!(channel.is_closed());
        assert_eq!(bus.subscriber_count(), 0);
    }
}
