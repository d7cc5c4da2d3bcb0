use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::ItemId;

/// Percent recorded when a lesson page is opened.
pub const OPENED_PERCENT: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonStatus {
    InProgress,
    Completed,
}

impl LessonStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LessonStatus::InProgress => "in_progress",
            LessonStatus::Completed => "completed",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "in_progress" => Some(LessonStatus::InProgress),
            "completed" => Some(LessonStatus::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for LessonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reading position inside one lesson.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonState {
    pub percent: u8,
    pub status: LessonStatus,
    pub updated_at: DateTime<Utc>,
}

impl LessonState {
    /// Percent is clamped to 100.
    #[must_use]
    pub fn new(percent: u8, status: LessonStatus, updated_at: DateTime<Utc>) -> Self {
        Self {
            percent: percent.min(100),
            status,
            updated_at,
        }
    }

    #[must_use]
    pub fn opened(at: DateTime<Utc>) -> Self {
        Self::new(OPENED_PERCENT, LessonStatus::InProgress, at)
    }

    #[must_use]
    pub fn finished(at: DateTime<Utc>) -> Self {
        Self::new(100, LessonStatus::Completed, at)
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == LessonStatus::Completed
    }
}

/// Per-lesson reading state for one scope, across all courses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LessonBook {
    entries: BTreeMap<ItemId, LessonState>,
}

impl LessonBook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `state` for `lesson`, replacing what was there.
    pub fn set(&mut self, lesson: ItemId, state: LessonState) {
        self.entries.insert(lesson, state);
    }

    /// Record that `lesson` was opened. A completed lesson stays completed.
    ///
    /// Returns the state as stored.
    pub fn open(&mut self, lesson: ItemId, at: DateTime<Utc>) -> LessonState {
        *self
            .entries
            .entry(lesson)
            .and_modify(|state| {
                if !state.is_completed() {
                    *state = LessonState::opened(at);
                }
            })
            .or_insert_with(|| LessonState::opened(at))
    }

    /// Union `other` into this book. Existing entries win on collision.
    ///
    /// Returns the lessons adopted from `other`.
    pub fn absorb(&mut self, other: &LessonBook) -> Vec<ItemId> {
        let mut adopted = Vec::new();
        for (lesson, state) in &other.entries {
            if !self.entries.contains_key(lesson) {
                self.entries.insert(lesson.clone(), *state);
                adopted.push(lesson.clone());
            }
        }
        adopted
    }

    #[must_use]
    pub fn get(&self, lesson: &ItemId) -> Option<&LessonState> {
        self.entries.get(lesson)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ItemId, &LessonState)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn lesson(raw: &str) -> ItemId {
        ItemId::new(raw).unwrap()
    }

    #[test]
    fn reopening_does_not_undo_completion() {
        let mut book = LessonBook::new();
        book.open(lesson("l1"), fixed_now());
        book.set(lesson("l1"), LessonState::finished(fixed_now()));

        let state = book.open(lesson("l1"), fixed_now() + Duration::days(1));
        assert_eq!(state.status, LessonStatus::Completed);
        assert_eq!(state.percent, 100);
    }

    #[test]
    fn opening_resets_partial_progress() {
        let mut book = LessonBook::new();
        book.set(
            lesson("l2"),
            LessonState::new(60, LessonStatus::InProgress, fixed_now()),
        );
        let state = book.open(lesson("l2"), fixed_now());
        assert_eq!(state.percent, OPENED_PERCENT);
    }

    #[test]
    fn absorb_keeps_existing_entries() {
        let mut mine = LessonBook::new();
        mine.set(lesson("l1"), LessonState::finished(fixed_now()));
        let mut other = LessonBook::new();
        other.open(lesson("l1"), fixed_now());
        other.open(lesson("l2"), fixed_now());

        assert_eq!(mine.absorb(&other), vec![lesson("l2")]);
        assert!(mine.get(&lesson("l1")).unwrap().is_completed());
        assert_eq!(mine.len(), 2);
    }

    #[test]
    fn percent_is_clamped_and_status_round_trips() {
        assert_eq!(LessonState::new(250, LessonStatus::InProgress, fixed_now()).percent, 100);
        for status in [LessonStatus::InProgress, LessonStatus::Completed] {
            assert_eq!(LessonStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(LessonStatus::parse("done"), None);
    }
}
