//! Status derivation over a curriculum and a completion set.
//!
//! Status is a pure function of set membership and global order: an item is
//! `Done` whenever it is completed, even if an earlier item is still open.
//! The sequencer reports status only; it never refuses a completion.

use std::collections::BTreeSet;
use std::fmt;

use crate::model::{Curriculum, CurriculumItem, ItemId, ModuleId};

/// Subtitle shown when nothing is left to do.
pub const COMPLETED_SENTINEL: &str = "Completed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemStatus {
    Done,
    Next,
    Locked,
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ItemStatus::Done => "done",
            ItemStatus::Next => "next",
            ItemStatus::Locked => "locked",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemProgress {
    pub item: CurriculumItem,
    pub status: ItemStatus,
}

/// Done/total badge for one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleProgress {
    pub module_id: ModuleId,
    pub title: String,
    pub done: usize,
    pub total: usize,
}

/// Derived view of a course for navigation and lock UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseRoadmap {
    pub items: Vec<ItemProgress>,
    pub modules: Vec<ModuleProgress>,
    pub next: Option<ItemId>,
    pub next_module_title: String,
    pub completed: usize,
    pub total: usize,
    pub percentage: u8,
}

impl CourseRoadmap {
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.next.is_none()
    }

    #[must_use]
    pub fn status_of(&self, id: &ItemId) -> Option<ItemStatus> {
        self.items
            .iter()
            .find(|p| p.item.id() == id)
            .map(|p| p.status)
    }
}

/// `round(completed / total * 100)`, clamped to 100; 0 when `total` is 0.
///
/// Rounds halves up.
#[must_use]
pub fn percentage(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let completed = completed.min(total) as u128;
    let total = total as u128;
    let pct = (completed * 200 + total) / (total * 2);
    u8::try_from(pct.min(100)).unwrap_or(100)
}

/// Walk the global order once and assign every item its status.
#[must_use]
pub fn derive(curriculum: &Curriculum, completed: &BTreeSet<ItemId>) -> CourseRoadmap {
    let mut next: Option<&CurriculumItem> = None;
    let mut items = Vec::with_capacity(curriculum.item_count());
    let mut done = 0;

    for item in curriculum.items() {
        let status = if completed.contains(item.id()) {
            done += 1;
            ItemStatus::Done
        } else if next.is_none() {
            next = Some(item);
            ItemStatus::Next
        } else {
            ItemStatus::Locked
        };
        items.push(ItemProgress {
            item: item.clone(),
            status,
        });
    }

    let modules = curriculum
        .modules()
        .iter()
        .map(|module| ModuleProgress {
            module_id: module.id().clone(),
            title: module.title().to_owned(),
            done: module
                .items()
                .iter()
                .filter(|item| completed.contains(item.id()))
                .count(),
            total: module.items().len(),
        })
        .collect();

    let next_module_title = next
        .and_then(|item| curriculum.module(item.module_id()))
        .map_or_else(|| COMPLETED_SENTINEL.to_owned(), |m| m.title().to_owned());

    let total = items.len();
    CourseRoadmap {
        items,
        modules,
        next: next.map(|item| item.id().clone()),
        next_module_title,
        completed: done,
        total,
        percentage: percentage(done, total),
    }
}
