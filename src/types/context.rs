use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::rule::Data;
use super::value::Value;

/// Type-erased snapshot payload.
pub trait SnapshotData: Any + fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + fmt::Debug + Send + Sync> SnapshotData for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A structural copy of the data a rule ran against, captured for audit.
///
/// Snapshots never alias the live data. The payload type is whatever the rule
/// was evaluated over; recover it with [`downcast_ref`](Self::downcast_ref).
#[derive(Clone)]
pub struct Snapshot(Arc<dyn SnapshotData>);

impl Snapshot {
    pub fn capture<T: Data>(data: &T) -> Self {
        Self(Arc::new(data.clone()))
    }

    #[must_use]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        (*self.0).as_any().downcast_ref::<T>()
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

/// Leaf outcome record for one rule evaluated by a ruleset.
#[derive(Debug, Clone)]
pub struct RuleContext {
    rule_name: String,
    data_before: Snapshot,
    data_after: Option<Snapshot>,
    result: bool,
    output: Option<bool>,
}

impl RuleContext {
    /// A fresh record: `result` is `false` until the rule's branch has run.
    pub fn new(rule_name: impl Into<String>, data_before: Snapshot) -> Self {
        Self {
            rule_name: rule_name.into(),
            data_before,
            data_after: None,
            result: false,
            output: None,
        }
    }

    #[must_use]
    pub fn rule_name(&self) -> &str {
        &self.rule_name
    }

    #[must_use]
    pub fn data_before(&self) -> &Snapshot {
        &self.data_before
    }

    /// `None` if the rule's branch never completed.
    #[must_use]
    pub fn data_after(&self) -> Option<&Snapshot> {
        self.data_after.as_ref()
    }

    #[must_use]
    pub fn result(&self) -> bool {
        self.result
    }

    /// The value returned by the rule's `success`/`failure` branch, if one ran.
    #[must_use]
    pub fn output(&self) -> Option<bool> {
        self.output
    }

    pub(crate) fn complete(&mut self, result: bool, output: Option<bool>, data_after: Snapshot) {
        self.result = result;
        self.output = output;
        self.data_after = Some(data_after);
    }
}

/// A child of a [`RootContext`].
#[derive(Debug, Clone)]
pub enum ContextEntry {
    Rule(RuleContext),
    Root(RootContext),
    /// Arbitrary state stored by callers or custom rules. Verifies as passing.
    Value(Value),
}

impl ContextEntry {
    fn verify(&self) -> bool {
        match self {
            ContextEntry::Rule(rule) => rule.result,
            ContextEntry::Root(root) => root.verify(),
            ContextEntry::Value(_) => true,
        }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    key: String,
    entry: ContextEntry,
    written: u64,
}

/// The execution-trace tree: an insertion-ordered map from name to
/// [`ContextEntry`].
///
/// Keys are unique. Inserting under an existing key replaces the entry in
/// place (last write wins) and keeps its original position.
#[derive(Debug, Clone, Default)]
pub struct RootContext {
    slots: Vec<Slot>,
    index: HashMap<String, usize>,
    clock: u64,
}

/// A point in a context's write history, see [`RootContext::mark`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ContextMark(u64);

impl RootContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entry, returning the replaced one.
    pub fn insert(&mut self, key: impl Into<String>, entry: ContextEntry) -> Option<ContextEntry> {
        let key = key.into();
        self.clock += 1;
        if let Some(&idx) = self.index.get(&key) {
            let slot = &mut self.slots[idx];
            slot.written = self.clock;
            return Some(std::mem::replace(&mut slot.entry, entry));
        }
        self.index.insert(key.clone(), self.slots.len());
        self.slots.push(Slot {
            key,
            entry,
            written: self.clock,
        });
        None
    }

    /// Store a plain value under `key`.
    pub fn insert_value(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.insert(key, ContextEntry::Value(value.into()));
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ContextEntry> {
        self.index.get(key).map(|&idx| &self.slots[idx].entry)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut ContextEntry> {
        self.index.get(key).map(|&idx| &mut self.slots[idx].entry)
    }

    /// The [`RuleContext`] stored under `key`, if that entry is a rule record.
    #[must_use]
    pub fn rule(&self, key: &str) -> Option<&RuleContext> {
        match self.get(key)? {
            ContextEntry::Rule(rule) => Some(rule),
            _ => None,
        }
    }

    /// The nested [`RootContext`] stored under `key`, if any.
    #[must_use]
    pub fn nested(&self, key: &str) -> Option<&RootContext> {
        match self.get(key)? {
            ContextEntry::Root(root) => Some(root),
            _ => None,
        }
    }

    #[must_use]
    pub fn value(&self, key: &str) -> Option<&Value> {
        match self.get(key)? {
            ContextEntry::Value(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ContextEntry)> {
        self.slots.iter().map(|s| (s.key.as_str(), &s.entry))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|s| s.key.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Recursively check the whole tree: rule records contribute their result,
    /// nested roots must pass entirely, and any other value passes.
    #[must_use]
    pub fn verify(&self) -> bool {
        self.slots.iter().all(|s| s.entry.verify())
    }

    /// The current write position. Entries inserted or replaced after this
    /// point are the ones [`verify_since`](Self::verify_since) inspects.
    #[must_use]
    pub fn mark(&self) -> ContextMark {
        ContextMark(self.clock)
    }

    /// [`verify`](Self::verify) restricted to entries written after `mark`.
    #[must_use]
    pub fn verify_since(&self, mark: ContextMark) -> bool {
        self.slots
            .iter()
            .filter(|s| s.written > mark.0)
            .all(|s| s.entry.verify())
    }

    /// Finish the rule record under `key`. A no-op if the entry has since been
    /// replaced by something other than a rule record.
    pub(crate) fn complete_rule(
        &mut self,
        key: &str,
        result: bool,
        output: Option<bool>,
        data_after: Snapshot,
    ) {
        if let Some(ContextEntry::Rule(rule)) = self.get_mut(key) {
            rule.complete(result, output, data_after);
        }
    }
}
