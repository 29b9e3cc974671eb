//! Tag index and dependency graph
//!
//! Both map a label to the stored entries carrying it. An entry is a key in
//! one strategy, so the same key written to two backends is tracked twice
//! and each copy keeps its own labels. A reverse record per entry makes
//! removal proportional to the entry's own labels instead of the whole
//! index.

use crate::cache::types::{CacheKey, CacheStrategy};
use std::collections::{BTreeSet, HashMap, HashSet};

/// One stored entry: the backend it lives in and its key
pub type Slot = (CacheStrategy, CacheKey);

/// Labels recorded for one stored entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRecord {
    pub tags: BTreeSet<String>,
    pub dependencies: BTreeSet<String>,
}

/// Which of the two label maps an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelKind {
    Tag,
    Dependency,
}

/// Denormalized label -> entries maps kept in lockstep with the backends
#[derive(Debug, Default)]
pub struct CacheIndex {
    tags: HashMap<String, HashSet<Slot>>,
    dependencies: HashMap<String, HashSet<Slot>>,
    records: HashMap<Slot, KeyRecord>,
}

impl CacheIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `key` in `strategy` with exactly these labels, replacing what
    /// that entry had before
    pub fn track(
        &mut self,
        key: &str,
        strategy: CacheStrategy,
        tags: &BTreeSet<String>,
        dependencies: &BTreeSet<String>,
    ) {
        self.untrack(key, strategy);

        let slot: Slot = (strategy, key.to_string());
        for tag in tags {
            self.tags
                .entry(tag.clone())
                .or_default()
                .insert(slot.clone());
        }
        for dependency in dependencies {
            self.dependencies
                .entry(dependency.clone())
                .or_default()
                .insert(slot.clone());
        }

        self.records.insert(
            slot,
            KeyRecord {
                tags: tags.clone(),
                dependencies: dependencies.clone(),
            },
        );
    }

    /// Drop every membership of `key` in `strategy`, returning what it had
    pub fn untrack(&mut self, key: &str, strategy: CacheStrategy) -> Option<KeyRecord> {
        let slot: Slot = (strategy, key.to_string());
        let record = self.records.remove(&slot)?;

        for tag in &record.tags {
            remove_member(&mut self.tags, tag, &slot);
        }
        for dependency in &record.dependencies {
            remove_member(&mut self.dependencies, dependency, &slot);
        }

        Some(record)
    }

    pub fn record(&self, key: &str, strategy: CacheStrategy) -> Option<&KeyRecord> {
        self.records.get(&(strategy, key.to_string()))
    }

    /// Union of the entries carrying any of `labels`
    pub fn keys_for(&self, kind: LabelKind, labels: &[String]) -> Vec<Slot> {
        let map = self.map(kind);
        let mut seen = HashSet::new();
        let mut slots = Vec::new();

        for label in labels {
            let Some(members) = map.get(label) else {
                continue;
            };
            for slot in members {
                if seen.insert(slot) {
                    slots.push(slot.clone());
                }
            }
        }

        slots
    }

    /// Whether the entry under `key` in `strategy` still carries one of `labels`
    pub fn carries_any(
        &self,
        key: &str,
        strategy: CacheStrategy,
        kind: LabelKind,
        labels: &[String],
    ) -> bool {
        self.record(key, strategy).is_some_and(|record| {
            let own = match kind {
                LabelKind::Tag => &record.tags,
                LabelKind::Dependency => &record.dependencies,
            };
            labels.iter().any(|label| own.contains(label))
        })
    }

    /// Remove buckets whose entry set is empty, returning how many went
    pub fn prune_empty(&mut self) -> usize {
        let before = self.tags.len() + self.dependencies.len();
        self.tags.retain(|_, slots| !slots.is_empty());
        self.dependencies.retain(|_, slots| !slots.is_empty());
        before - (self.tags.len() + self.dependencies.len())
    }

    pub fn clear(&mut self) {
        self.tags.clear();
        self.dependencies.clear();
        self.records.clear();
    }

    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }

    pub fn dependency_count(&self) -> usize {
        self.dependencies.len()
    }

    /// Keys currently tagged with `tag`, in any strategy
    pub fn keys_with_tag(&self, tag: &str) -> Vec<CacheKey> {
        distinct_keys(self.tags.get(tag))
    }

    /// Keys currently depending on `dependency`, in any strategy
    pub fn keys_depending_on(&self, dependency: &str) -> Vec<CacheKey> {
        distinct_keys(self.dependencies.get(dependency))
    }

    /// Rough byte footprint of the index
    pub fn approximate_size(&self) -> usize {
        let buckets = |map: &HashMap<String, HashSet<Slot>>| -> usize {
            map.iter()
                .map(|(label, slots)| {
                    label.len() + slots.iter().map(|(_, key)| key.len()).sum::<usize>()
                })
                .sum()
        };
        let records: usize = self
            .records
            .iter()
            .map(|((_, key), record)| {
                key.len()
                    + record.tags.iter().map(String::len).sum::<usize>()
                    + record.dependencies.iter().map(String::len).sum::<usize>()
            })
            .sum();
        buckets(&self.tags) + buckets(&self.dependencies) + records
    }

    fn map(&self, kind: LabelKind) -> &HashMap<String, HashSet<Slot>> {
        match kind {
            LabelKind::Tag => &self.tags,
            LabelKind::Dependency => &self.dependencies,
        }
    }
}

fn remove_member(map: &mut HashMap<String, HashSet<Slot>>, label: &str, slot: &Slot) {
    if let Some(slots) = map.get_mut(label) {
        slots.remove(slot);
        if slots.is_empty() {
            map.remove(label);
        }
    }
}

fn distinct_keys(slots: Option<&HashSet<Slot>>) -> Vec<CacheKey> {
    slots
        .map(|slots| {
            slots
                .iter()
                .map(|(_, key)| key.clone())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        })
        .unwrap_or_default()
}
