//! Per-session record of branch options the learner has already picked

use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};

use crate::core::types::NodeId;

/// Which layer of the ledger filters options when a prompt is revisited
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupScope {
    /// Only options chosen under the same prompt are suppressed
    PerParent,
    /// An option chosen anywhere in the session is suppressed everywhere
    #[default]
    Global,
}

/// Choices made during one session. Never shared between sessions.
#[derive(Debug, Clone, Default)]
pub struct ChoiceLedger {
    per_parent: AHashMap<NodeId, AHashSet<NodeId>>,
    globally: AHashSet<NodeId>,
}

impl ChoiceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `option` as chosen under `parent`.
    ///
    /// Returns `false` if it was already recorded there.
    pub fn record(&mut self, parent: &NodeId, option: &NodeId) -> bool {
        self.globally.insert(option.clone());
        self.per_parent
            .entry(parent.clone())
            .or_default()
            .insert(option.clone())
    }

    pub fn chosen_under(&self, parent: &NodeId, option: &NodeId) -> bool {
        self.per_parent
            .get(parent)
            .is_some_and(|chosen| chosen.contains(option))
    }

    pub fn chosen_anywhere(&self, option: &NodeId) -> bool {
        self.globally.contains(option)
    }

    pub fn is_chosen(&self, scope: DedupScope, parent: &NodeId, option: &NodeId) -> bool {
        match scope {
            DedupScope::PerParent => self.chosen_under(parent, option),
            DedupScope::Global => self.chosen_anywhere(option),
        }
    }

    /// Options under `parent` that may still be offered, in authored order
    pub fn available(&self, scope: DedupScope, parent: &NodeId, options: &[NodeId]) -> Vec<NodeId> {
        options
            .iter()
            .filter(|option| !self.is_chosen(scope, parent, option))
            .cloned()
            .collect()
    }

    /// Number of options recorded under `parent`
    pub fn chosen_count(&self, parent: &NodeId) -> usize {
        self.per_parent.get(parent).map_or(0, |chosen| chosen.len())
    }

    pub fn total_chosen(&self) -> usize {
        self.globally.len()
    }

    pub fn reset(&mut self) {
        self.per_parent.clear();
        self.globally.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ids(raw: &[&str]) -> Vec<NodeId> {
        raw.iter().map(|s| NodeId::from(*s)).collect()
    }

    #[test]
    fn test_record_is_idempotent() {
        let mut ledger = ChoiceLedger::new();
        let prompt = NodeId::from("2");
        let option = NodeId::from("2.1");

        assert!(ledger.record(&prompt, &option));
        assert!(!ledger.record(&prompt, &option));
        assert_eq!(ledger.chosen_count(&prompt), 1);
        assert_eq!(ledger.total_chosen(), 1);
    }

    #[test]
    fn test_available_preserves_order() {
        let mut ledger = ChoiceLedger::new();
        let prompt = NodeId::from("2");
        ledger.record(&prompt, &NodeId::from("2.2"));

        let options = ids(&["2.1", "2.2", "2.3"]);
        assert_eq!(
            ledger.available(DedupScope::PerParent, &prompt, &options),
            ids(&["2.1", "2.3"])
        );
    }

    #[test]
    fn test_scopes_differ_across_parents() {
        let mut ledger = ChoiceLedger::new();
        let shared = NodeId::from("9.1");
        ledger.record(&NodeId::from("4"), &shared);

        let other_parent = NodeId::from("9");
        assert!(!ledger.is_chosen(DedupScope::PerParent, &other_parent, &shared));
        assert!(ledger.is_chosen(DedupScope::Global, &other_parent, &shared));
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut ledger = ChoiceLedger::new();
        ledger.record(&NodeId::from("1"), &NodeId::from("1.1"));
        ledger.reset();
        assert_eq!(ledger.total_chosen(), 0);
        assert!(!ledger.chosen_anywhere(&NodeId::from("1.1")));
    }

    proptest! {
        #[test]
        fn prop_recorded_options_never_available(picks in proptest::collection::vec(0usize..6, 0..12)) {
            let prompt = NodeId::from("p");
            let options: Vec<NodeId> = (0..6).map(|i| NodeId::new(format!("p.{}", i))).collect();
            let mut ledger = ChoiceLedger::new();
            for pick in &picks {
                ledger.record(&prompt, &options[*pick]);
            }
            for scope in [DedupScope::PerParent, DedupScope::Global] {
                let available = ledger.available(scope, &prompt, &options);
                for pick in &picks {
                    prop_assert!(!available.contains(&options[*pick]));
                }
            }
        }
    }
}
