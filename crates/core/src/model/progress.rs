use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};

use crate::model::ids::{ItemId, UserId};

//
// ─── SCOPE ─────────────────────────────────────────────────────────────────────
//

/// Identity context that partitions progress ledgers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Scope {
    #[default]
    Anonymous,
    Identified(UserId),
}

impl Scope {
    #[must_use]
    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Scope::Anonymous => None,
            Scope::Identified(user) => Some(user),
        }
    }

    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Scope::Anonymous)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Anonymous => f.write_str("anon"),
            Scope::Identified(user) => write!(f, "{user}"),
        }
    }
}

//
// ─── RECORDS ───────────────────────────────────────────────────────────────────
//

/// Proof that an item was completed. Absence means "not completed".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRecord {
    pub item_id: ItemId,
    pub completed_at: DateTime<Utc>,
}

impl CompletionRecord {
    #[must_use]
    pub fn new(item_id: ItemId, completed_at: DateTime<Utc>) -> Self {
        Self {
            item_id,
            completed_at,
        }
    }
}

//
// ─── LEDGER ────────────────────────────────────────────────────────────────────
//

/// Per-scope, per-course mapping from item to completion record.
///
/// Records only accumulate; the whole ledger is discarded by a course reset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressLedger {
    records: BTreeMap<ItemId, CompletionRecord>,
}

impl ProgressLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completion.
    ///
    /// Returns `false` without touching the existing record when the item was
    /// already completed, so the first timestamp is kept.
    pub fn record(&mut self, item_id: ItemId, completed_at: DateTime<Utc>) -> bool {
        if self.records.contains_key(&item_id) {
            return false;
        }
        self.records
            .insert(item_id.clone(), CompletionRecord::new(item_id, completed_at));
        true
    }

    /// Union `other` into this ledger. Existing records win on collision.
    ///
    /// Returns the ids adopted from `other`.
    pub fn absorb(&mut self, other: &ProgressLedger) -> Vec<ItemId> {
        let mut adopted = Vec::new();
        for (id, record) in &other.records {
            if !self.records.contains_key(id) {
                self.records.insert(id.clone(), record.clone());
                adopted.push(id.clone());
            }
        }
        adopted
    }

    /// Union of two ledgers where `preferred` wins on collision.
    #[must_use]
    pub fn merged(preferred: &ProgressLedger, other: &ProgressLedger) -> ProgressLedger {
        let mut out = preferred.clone();
        out.absorb(other);
        out
    }

    #[must_use]
    pub fn get(&self, item_id: &ItemId) -> Option<&CompletionRecord> {
        self.records.get(item_id)
    }

    #[must_use]
    pub fn contains(&self, item_id: &ItemId) -> bool {
        self.records.contains_key(item_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn item_ids(&self) -> BTreeSet<ItemId> {
        self.records.keys().cloned().collect()
    }

    pub fn records(&self) -> impl Iterator<Item = &CompletionRecord> {
        self.records.values()
    }

    #[must_use]
    pub fn into_map(self) -> BTreeMap<ItemId, CompletionRecord> {
        self.records
    }
}

impl FromIterator<CompletionRecord> for ProgressLedger {
    fn from_iter<T: IntoIterator<Item = CompletionRecord>>(iter: T) -> Self {
        let mut ledger = ProgressLedger::new();
        for record in iter {
            ledger.record(record.item_id, record.completed_at);
        }
        ledger
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn id(raw: &str) -> ItemId {
        ItemId::new(raw).unwrap()
    }

    #[test]
    fn record_is_idempotent_and_keeps_first_timestamp() {
        let mut ledger = ProgressLedger::new();
        assert!(ledger.record(id("a"), fixed_now()));
        assert!(!ledger.record(id("a"), fixed_now() + Duration::days(1)));
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.get(&id("a")).unwrap().completed_at, fixed_now());
    }

    #[test]
    fn merge_is_a_union() {
        let anon: ProgressLedger = [CompletionRecord::new(id("x"), fixed_now())]
            .into_iter()
            .collect();
        let user: ProgressLedger = [CompletionRecord::new(id("y"), fixed_now())]
            .into_iter()
            .collect();

        let merged = ProgressLedger::merged(&user, &anon);
        assert_eq!(merged.item_ids(), [id("x"), id("y")].into_iter().collect());
    }

    #[test]
    fn merge_prefers_first_ledger_on_collision() {
        let later = fixed_now() + Duration::hours(3);
        let user: ProgressLedger = [CompletionRecord::new(id("x"), fixed_now())]
            .into_iter()
            .collect();
        let anon: ProgressLedger = [CompletionRecord::new(id("x"), later)].into_iter().collect();

        let merged = ProgressLedger::merged(&user, &anon);
        assert_eq!(merged.get(&id("x")).unwrap().completed_at, fixed_now());
    }

    #[test]
    fn merge_twice_equals_merge_once() {
        let a: ProgressLedger = [CompletionRecord::new(id("a"), fixed_now())]
            .into_iter()
            .collect();
        let b: ProgressLedger = [
            CompletionRecord::new(id("b"), fixed_now()),
            CompletionRecord::new(id("a"), fixed_now()),
        ]
        .into_iter()
        .collect();

        let once = ProgressLedger::merged(&a, &b);
        let twice = ProgressLedger::merged(&once, &b);
        assert_eq!(once, twice);
    }

    #[test]
    fn absorb_reports_adopted_ids() {
        let mut base: ProgressLedger = [CompletionRecord::new(id("a"), fixed_now())]
            .into_iter()
            .collect();
        let other: ProgressLedger = [
            CompletionRecord::new(id("a"), fixed_now()),
            CompletionRecord::new(id("b"), fixed_now()),
        ]
        .into_iter()
        .collect();
        assert_eq!(base.absorb(&other), vec![id("b")]);
    }

    #[test]
    fn scope_display_matches_key_segment() {
        assert_eq!(Scope::Anonymous.to_string(), "anon");
        let user = Scope::Identified(UserId::new("u-1").unwrap());
        assert_eq!(user.to_string(), "u-1");
        assert!(user.user_id().is_some());
    }
}
