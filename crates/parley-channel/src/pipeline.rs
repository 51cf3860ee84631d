//! Ordered, pattern-dispatched stage list.
//!
//! A [`Pipeline`] is a rule table: stages run in registration order, a stage
//! with a [`Pattern`] is skipped unless the message matches it, and a stage
//! returning [`Flow::Terminate`] ends the run. Stages without a pattern run
//! for every message that gets that far.
//!
//! The engine itself has no error channel; handlers own their failures.

use std::borrow::Cow;

use parley_core::Message;
use serde_json::Value;

/// Field access used by pattern matching.
pub trait Fields {
    /// Value stored under `key`, if any.
    fn field(&self, key: &str) -> Option<Cow<'_, Value>>;
}

impl Fields for Message {
    fn field(&self, key: &str) -> Option<Cow<'_, Value>> {
        Message::field(self, key)
    }
}

impl Fields for serde_json::Map<String, Value> {
    fn field(&self, key: &str) -> Option<Cow<'_, Value>> {
        self.get(key).map(Cow::Borrowed)
    }
}

/// What a single pattern entry requires.
#[derive(Clone, Debug, PartialEq)]
pub enum Expect {
    /// Field present and equal.
    Equals(Value),
    /// Field present with any non-empty value.
    Present,
}

/// Partial match over a message's fields. Every entry must hold.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Pattern {
    entries: Vec<(String, Expect)>,
}

impl Pattern {
    /// Pattern that matches every message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `key` to equal `value`.
    #[must_use]
    pub fn eq(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.entries.push((key.to_string(), Expect::Equals(value.into())));
        self
    }

    /// Require `key` to hold any non-empty value.
    #[must_use]
    pub fn present(mut self, key: &str) -> Self {
        self.entries.push((key.to_string(), Expect::Present));
        self
    }

    /// Whether every entry holds for `message`.
    pub fn matches<M: Fields + ?Sized>(&self, message: &M) -> bool {
        self.entries.iter().all(|(key, expect)| match message.field(key) {
            None => false,
            Some(value) => match expect {
                Expect::Equals(want) => value.as_ref() == want,
                Expect::Present => !is_empty(&value),
            },
        })
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Whether the chain continues after a handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    /// Run the next stage.
    Continue,
    /// Stop here; later stages are skipped.
    Terminate,
}

type Handler<S, M> = Box<dyn Fn(&mut S, &mut M) -> Flow + Send + Sync>;

/// One `(pattern, handler)` unit.
pub struct Stage<S, M> {
    name: &'static str,
    pattern: Option<Pattern>,
    handler: Handler<S, M>,
}

impl<S, M> Stage<S, M> {
    /// Name used in logs.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Guard pattern, `None` for an always-run stage.
    pub fn pattern(&self) -> Option<&Pattern> {
        self.pattern.as_ref()
    }
}

/// Result of running one message through the pipeline.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunOutcome {
    /// Stage that terminated the chain, if any.
    pub terminated_by: Option<&'static str>,
    /// Names of the stages whose handlers ran, in order.
    pub ran: Vec<&'static str>,
}

/// Ordered stage list over shared state `S` and an in-flight message `M`.
pub struct Pipeline<S, M> {
    stages: Vec<Stage<S, M>>,
}

impl<S, M: Fields> Pipeline<S, M> {
    /// Pipeline with no stages.
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Append a stage that runs for every message reaching it.
    #[must_use]
    pub fn stage<F>(self, name: &'static str, handler: F) -> Self
    where
        F: Fn(&mut S, &mut M) -> Flow + Send + Sync + 'static,
    {
        self.push(name, None, handler)
    }

    /// Append a stage that runs only when `pattern` matches.
    #[must_use]
    pub fn stage_when<F>(self, name: &'static str, pattern: Pattern, handler: F) -> Self
    where
        F: Fn(&mut S, &mut M) -> Flow + Send + Sync + 'static,
    {
        self.push(name, Some(pattern), handler)
    }

    fn push<F>(mut self, name: &'static str, pattern: Option<Pattern>, handler: F) -> Self
    where
        F: Fn(&mut S, &mut M) -> Flow + Send + Sync + 'static,
    {
        self.stages.push(Stage {
            name,
            pattern,
            handler: Box::new(handler),
        });
        self
    }

    /// Evaluate stages in order until one terminates or the list ends.
    ///
    /// A pattern is checked against the message as mutated by earlier
    /// stages.
    pub fn run(&self, state: &mut S, message: &mut M) -> RunOutcome {
        let mut outcome = RunOutcome::default();
        for stage in &self.stages {
            if let Some(pattern) = &stage.pattern {
                if !pattern.matches(message) {
                    continue;
                }
            }
            outcome.ran.push(stage.name);
            if (stage.handler)(state, message) == Flow::Terminate {
                outcome.terminated_by = Some(stage.name);
                break;
            }
        }
        outcome
    }

    /// Stages in run order.
    pub fn stages(&self) -> &[Stage<S, M>] {
        &self.stages
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl<S, M: Fields> Default for Pipeline<S, M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};

    type Msg = Map<String, Value>;

    fn msg(value: Value) -> Msg {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn pattern_equality() {
        let p = Pattern::new().eq("request", "rename");
        assert!(p.matches(&msg(json!({"request": "rename", "name": "x"}))));
        assert!(!p.matches(&msg(json!({"request": "identify"}))));
        assert!(!p.matches(&msg(json!({"name": "x"}))));
    }

    #[test]
    fn pattern_wildcard_requires_non_empty() {
        let p = Pattern::new().present("recipient");
        assert!(p.matches(&msg(json!({"recipient": "bob"}))));
        assert!(p.matches(&msg(json!({"recipient": 0}))));
        assert!(!p.matches(&msg(json!({"recipient": ""}))));
        assert!(!p.matches(&msg(json!({"recipient": null}))));
        assert!(!p.matches(&msg(json!({}))));
    }

    #[test]
    fn pattern_requires_all_entries() {
        let p = Pattern::new().present("recipient").eq("kind", "dm");
        assert!(p.matches(&msg(json!({"recipient": "a", "kind": "dm"}))));
        assert!(!p.matches(&msg(json!({"recipient": "a"}))));
    }

    #[test]
    fn empty_pattern_matches_everything() {
        assert!(Pattern::new().matches(&msg(json!({}))));
    }

    #[test]
    fn stages_run_in_order() {
        let pipeline = Pipeline::<Vec<&'static str>, Msg>::new()
            .stage("a", |log: &mut Vec<&'static str>, _| {
                log.push("a");
                Flow::Continue
            })
            .stage("b", |log: &mut Vec<&'static str>, _| {
                log.push("b");
                Flow::Continue
            });
        let mut log = Vec::new();
        let outcome = pipeline.run(&mut log, &mut Map::new());
        assert_eq!(log, vec!["a", "b"]);
        assert_eq!(outcome.ran, vec!["a", "b"]);
        assert_eq!(outcome.terminated_by, None);
    }

    #[test]
    fn terminate_stops_chain() {
        let pipeline = Pipeline::<u32, Msg>::new()
            .stage("first", |n, _| {
                *n += 1;
                Flow::Terminate
            })
            .stage("never", |n, _| {
                *n += 100;
                Flow::Continue
            });
        let mut n = 0;
        let outcome = pipeline.run(&mut n, &mut Map::new());
        assert_eq!(n, 1);
        assert_eq!(outcome.terminated_by, Some("first"));
    }

    #[test]
    fn unmatched_stage_is_skipped() {
        let pipeline = Pipeline::<u32, Msg>::new()
            .stage_when("only_x", Pattern::new().eq("k", "x"), |n, _| {
                *n += 1;
                Flow::Terminate
            })
            .stage("tail", |n, _| {
                *n += 10;
                Flow::Continue
            });
        let mut n = 0;
        let outcome = pipeline.run(&mut n, &mut msg(json!({"k": "y"})));
        assert_eq!(n, 10);
        assert_eq!(outcome.ran, vec!["tail"]);
    }

    #[test]
    fn later_patterns_see_earlier_mutations() {
        let pipeline = Pipeline::<u32, Msg>::new()
            .stage("mark", |_, m: &mut Msg| {
                let _ = m.insert("flag".into(), json!(true));
                Flow::Continue
            })
            .stage_when("flagged", Pattern::new().eq("flag", true), |n, _| {
                *n += 1;
                Flow::Continue
            });
        let mut n = 0;
        let _ = pipeline.run(&mut n, &mut Map::new());
        assert_eq!(n, 1);
    }

    #[test]
    fn stage_metadata() {
        let pipeline = Pipeline::<(), Msg>::new()
            .stage_when("p", Pattern::new().present("x"), |(), _| Flow::Continue)
            .stage("q", |(), _| Flow::Continue);
        assert_eq!(pipeline.len(), 2);
        let names: Vec<_> = pipeline.stages().iter().map(Stage::name).collect();
        assert_eq!(names, vec!["p", "q"]);
        assert!(pipeline.stages()[0].pattern().is_some());
        assert!(pipeline.stages()[1].pattern().is_none());
    }
}
