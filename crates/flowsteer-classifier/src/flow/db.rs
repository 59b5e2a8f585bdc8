//! The flow rule database.
//!
//! An ordered collection of installed rules keyed by hardware entry index.
//! At most one rule exists per index; iteration is always in ascending
//! index order, which the bulk operations rely on.

use flowsteer_hw::{EntryIndex, FuncId};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use super::rule::FlowRule;

/// Ordered rule store, keyed by entry index.
#[derive(Debug, Default)]
pub struct RuleDb {
    rules: BTreeMap<EntryIndex, FlowRule>,
}

impl RuleDb {
    pub fn new() -> Self {
        RuleDb {
            rules: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn find(&self, entry: EntryIndex) -> Option<&FlowRule> {
        self.rules.get(&entry)
    }

    pub fn find_mut(&mut self, entry: EntryIndex) -> Option<&mut FlowRule> {
        self.rules.get_mut(&entry)
    }

    /// Inserts a rule at its entry index, replacing any rule already there.
    pub fn insert(&mut self, rule: FlowRule) -> Option<FlowRule> {
        self.rules.insert(rule.entry, rule)
    }

    pub fn remove(&mut self, entry: EntryIndex) -> Option<FlowRule> {
        self.rules.remove(&entry)
    }

    /// All rules in ascending entry order.
    pub fn iter(&self) -> impl Iterator<Item = &FlowRule> {
        self.rules.values()
    }

    /// The owner's rules in ascending entry order.
    pub fn owned_by(&self, owner: FuncId) -> impl Iterator<Item = &FlowRule> {
        self.rules.values().filter(move |rule| rule.owner == owner)
    }

    /// The owner's rules within an inclusive entry range, ascending.
    pub fn owned_in_range(
        &self,
        owner: FuncId,
        range: RangeInclusive<EntryIndex>,
    ) -> impl Iterator<Item = &FlowRule> + '_ {
        self.rules
            .range(range)
            .map(|(_, rule)| rule)
            .filter(move |rule| rule.owner == owner)
    }

    /// Snapshot of matching entry indices, for loops that mutate the
    /// database while walking it.
    pub fn snapshot_indices<F>(&self, filter: F) -> Vec<EntryIndex>
    where
        F: Fn(&FlowRule) -> bool,
    {
        self.rules
            .values()
            .filter(|rule| filter(rule))
            .map(|rule| rule.entry)
            .collect()
    }
}
