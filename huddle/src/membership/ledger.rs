//! The set of display names a peer believes are online.

use std::collections::HashSet;

/// Insertion-ordered set of names believed to be online.
///
/// Holds at most one entry per distinct name. Entries are only removed by an
/// explicit EXIT; nothing expires, so a peer that vanishes without saying
/// goodbye stays listed.
#[derive(Debug, Clone, Default)]
pub struct PresenceLedger {
    order: Vec<String>,
    members: HashSet<String>,
}

impl PresenceLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `name`, returning `true` if it was not already present.
    ///
    /// Re-adding an existing name keeps its original position.
    pub fn insert(&mut self, name: &str) -> bool {
        if !self.members.insert(name.to_string()) {
            return false;
        }
        self.order.push(name.to_string());
        true
    }

    /// Remove `name`, returning `true` if it was present.
    pub fn remove(&mut self, name: &str) -> bool {
        if !self.members.remove(name) {
            return false;
        }
        self.order.retain(|n| n != name);
        true
    }

    /// Whether `name` is currently listed.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.members.contains(name)
    }

    /// Number of listed names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether no names are listed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Iterate over names in first-insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Snapshot of the names in first-insertion order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }
}
