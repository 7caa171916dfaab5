//! Take patterns and their compiled matchers.
//!
//! A [`Pattern`] is what a saga passes to `take`: a literal tag, the `"*"`
//! wildcard, a predicate, a tagged [`ActionCreator`], or a list of these
//! meaning "any of". The interpreter compiles a pattern once per `TAKE` into a
//! [`Matcher`], a single stateless predicate over events.

use crate::types::Event;
use serde_json::Value as Json;
use std::fmt;
use std::rc::Rc;

/// The wildcard tag.
pub const WILDCARD: &str = "*";

/// A predicate over events.
#[derive(Clone)]
pub struct Predicate(Rc<dyn Fn(&Event) -> bool>);

impl Predicate {
    /// Wraps a closure.
    pub fn new(f: impl Fn(&Event) -> bool + 'static) -> Self {
        Self(Rc::new(f))
    }

    /// Evaluates the predicate.
    #[must_use]
    pub fn test(&self, event: &Event) -> bool {
        (self.0)(event)
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Predicate(..)")
    }
}

/// An event constructor with a stable string identity.
///
/// Patterns built from a creator match events carrying the creator's tag, so
/// the same value can be used to build events and to wait for them.
#[derive(Clone)]
pub struct ActionCreator {
    tag: Rc<str>,
    prepare: Option<Rc<dyn Fn(Json) -> Json>>,
}

impl ActionCreator {
    /// Creates a creator whose events carry their input as payload.
    pub fn new(tag: impl Into<String>) -> Self {
        let tag: String = tag.into();
        Self {
            tag: Rc::from(tag),
            prepare: None,
        }
    }

    /// Transforms the input before it becomes the payload.
    #[must_use]
    pub fn with_prepare(mut self, prepare: impl Fn(Json) -> Json + 'static) -> Self {
        self.prepare = Some(Rc::new(prepare));
        self
    }

    /// Returns the tag this creator stamps on events.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Builds an event.
    #[must_use]
    pub fn create(&self, input: Json) -> Event {
        let payload = match &self.prepare {
            Some(prepare) => prepare(input),
            None => input,
        };
        Event::with_payload(self.tag.as_ref(), payload)
    }
}

impl fmt::Debug for ActionCreator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ActionCreator").field(&self.tag).finish()
    }
}

impl fmt::Display for ActionCreator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag)
    }
}

/// A take pattern.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Matches every event.
    Any,
    /// Matches events whose tag equals the literal.
    Tag(String),
    /// Matches events for which the predicate holds.
    Predicate(Predicate),
    /// Matches events carrying the creator's tag.
    Creator(ActionCreator),
    /// Matches if any sub-pattern matches, left to right.
    OneOf(Vec<Pattern>),
}

impl Pattern {
    /// Creates a predicate pattern.
    pub fn predicate(f: impl Fn(&Event) -> bool + 'static) -> Self {
        Self::Predicate(Predicate::new(f))
    }

    /// Creates an any-of pattern.
    pub fn one_of(patterns: impl IntoIterator<Item = impl Into<Pattern>>) -> Self {
        Self::OneOf(patterns.into_iter().map(Into::into).collect())
    }

    /// Evaluates the pattern against an event without compiling it.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        match self {
            Self::Any => true,
            Self::Tag(tag) => event.tag == *tag,
            Self::Predicate(predicate) => predicate.test(event),
            Self::Creator(creator) => event.tag == creator.tag(),
            Self::OneOf(patterns) => patterns.iter().any(|p| p.matches(event)),
        }
    }

    /// Compiles the pattern into a single predicate.
    #[must_use]
    pub fn compile(&self) -> Matcher {
        Matcher(match self {
            Self::Any => Rc::new(|_: &Event| true),
            Self::Tag(tag) => {
                let tag = tag.clone();
                Rc::new(move |event: &Event| event.tag == tag)
            }
            Self::Predicate(predicate) => Rc::clone(&predicate.0),
            Self::Creator(creator) => {
                let tag = Rc::clone(&creator.tag);
                Rc::new(move |event: &Event| event.tag == *tag)
            }
            Self::OneOf(patterns) => {
                let compiled: Vec<Matcher> = patterns.iter().map(Self::compile).collect();
                Rc::new(move |event: &Event| compiled.iter().any(|m| m.matches(event)))
            }
        })
    }
}

impl Default for Pattern {
    fn default() -> Self {
        Self::Any
    }
}

impl From<&str> for Pattern {
    fn from(tag: &str) -> Self {
        if tag == WILDCARD {
            Self::Any
        } else {
            Self::Tag(tag.to_string())
        }
    }
}

impl From<String> for Pattern {
    fn from(tag: String) -> Self {
        Self::from(tag.as_str())
    }
}

impl From<ActionCreator> for Pattern {
    fn from(creator: ActionCreator) -> Self {
        Self::Creator(creator)
    }
}

impl From<&ActionCreator> for Pattern {
    fn from(creator: &ActionCreator) -> Self {
        Self::Creator(creator.clone())
    }
}

impl From<Predicate> for Pattern {
    fn from(predicate: Predicate) -> Self {
        Self::Predicate(predicate)
    }
}

impl From<Vec<Pattern>> for Pattern {
    fn from(patterns: Vec<Pattern>) -> Self {
        Self::OneOf(patterns)
    }
}

impl<const N: usize> From<[&str; N]> for Pattern {
    fn from(tags: [&str; N]) -> Self {
        Self::one_of(tags)
    }
}

/// A compiled pattern.
#[derive(Clone)]
pub struct Matcher(Rc<dyn Fn(&Event) -> bool>);

impl Matcher {
    /// Returns true if the event is accepted.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        (self.0)(event)
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Matcher(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn ev(tag: &str) -> Event {
        Event::new(tag)
    }

    #[test]
    fn list_matches_members_only() {
        let pattern = Pattern::from(["A", "B"]);
        let matcher = pattern.compile();
        assert!(matcher.matches(&ev("A")));
        assert!(matcher.matches(&ev("B")));
        assert!(!matcher.matches(&ev("C")));
        assert!(!matcher.matches(&ev("AB")));
    }

    #[test]
    fn wildcard_matches_everything() {
        let matcher = Pattern::from("*").compile();
        assert!(matcher.matches(&ev("anything")));
        assert!(matches!(Pattern::from("*"), Pattern::Any));
    }

    #[test]
    fn predicate_result_is_used_directly() {
        let pattern = Pattern::predicate(|e| e.payload.get("urgent") == Some(&json!(true)));
        assert!(pattern.matches(&Event::with_payload("X", json!({"urgent": true}))));
        assert!(!pattern.matches(&Event::with_payload("X", json!({"urgent": false}))));
    }

    #[test]
    fn creator_matches_by_identity() {
        let add = ActionCreator::new("todo/add").with_prepare(|text| json!({ "text": text }));
        let event = add.create(json!("milk"));
        assert_eq!(event.tag, "todo/add");
        assert_eq!(event.payload, json!({"text": "milk"}));
        assert!(Pattern::from(&add).compile().matches(&event));
        assert!(!Pattern::from(add).matches(&ev("todo/remove")));
    }

    #[test]
    fn one_of_short_circuits_left_to_right() {
        use std::cell::Cell;
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let pattern = Pattern::OneOf(vec![
            Pattern::from("A"),
            Pattern::predicate(move |_| {
                counter.set(counter.get() + 1);
                false
            }),
        ]);
        let matcher = pattern.compile();
        assert!(matcher.matches(&ev("A")));
        assert_eq!(calls.get(), 0);
        assert!(!matcher.matches(&ev("B")));
        assert_eq!(calls.get(), 1);
    }

    proptest! {
        #[test]
        fn compiled_and_direct_forms_agree(tag in "[A-D]", members in proptest::collection::vec("[A-D]", 0..4)) {
            let event = ev(&tag);
            let single = Pattern::from(members.first().cloned().unwrap_or_else(|| "*".to_string()));
            prop_assert_eq!(single.matches(&event), single.compile().matches(&event));

            let list = Pattern::one_of(members.iter().map(String::as_str));
            let expected = members.iter().any(|m| *m == tag);
            prop_assert_eq!(list.matches(&event), expected);
            prop_assert_eq!(list.compile().matches(&event), expected);

            let as_predicate = {
                let members = members.clone();
                Pattern::predicate(move |e| members.iter().any(|m| *m == e.tag))
            };
            prop_assert_eq!(as_predicate.compile().matches(&event), expected);
        }
    }
}
