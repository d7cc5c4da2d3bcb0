use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{CourseId, IdError, ItemId, ModuleId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CurriculumError {
    #[error(transparent)]
    InvalidId(#[from] IdError),

    #[error("course title cannot be empty")]
    EmptyCourseTitle,

    #[error("module {0} has an empty title")]
    EmptyModuleTitle(ModuleId),

    #[error("item {0} has an empty title")]
    EmptyItemTitle(ItemId),

    #[error("duplicate module id: {0}")]
    DuplicateModule(ModuleId),

    #[error("duplicate item id: {0}")]
    DuplicateItem(ItemId),
}

//
// ─── ITEM KIND ─────────────────────────────────────────────────────────────────
//

/// What sort of learning unit an item is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Lesson,
    Exercise,
    Assessment,
    Project,
}

impl ItemKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::Lesson => "lesson",
            ItemKind::Exercise => "exercise",
            ItemKind::Assessment => "assessment",
            ItemKind::Project => "project",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── GRAPH ─────────────────────────────────────────────────────────────────────
//

/// A single addressable unit of learning content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurriculumItem {
    id: ItemId,
    title: String,
    kind: ItemKind,
    target: String,
    module_id: ModuleId,
}

impl CurriculumItem {
    #[must_use]
    pub fn id(&self) -> &ItemId {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    /// Where the UI navigates to open this item (path or route).
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    #[must_use]
    pub fn module_id(&self) -> &ModuleId {
        &self.module_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    id: ModuleId,
    title: String,
    items: Vec<CurriculumItem>,
}

impl Module {
    #[must_use]
    pub fn id(&self) -> &ModuleId {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn items(&self) -> &[CurriculumItem] {
        &self.items
    }
}

/// Immutable, ordered description of a course.
///
/// The global traversal order is module order, then in-module order. It is
/// fixed at construction and never depends on completion state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Curriculum {
    course_id: CourseId,
    title: String,
    modules: Vec<Module>,
}

impl Curriculum {
    #[must_use]
    pub fn course_id(&self) -> &CourseId {
        &self.course_id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// Items in global traversal order.
    pub fn items(&self) -> impl Iterator<Item = &CurriculumItem> {
        self.modules.iter().flat_map(|m| m.items.iter())
    }

    #[must_use]
    pub fn item_count(&self) -> usize {
        self.modules.iter().map(|m| m.items.len()).sum()
    }

    #[must_use]
    pub fn item(&self, id: &ItemId) -> Option<&CurriculumItem> {
        self.items().find(|item| item.id() == id)
    }

    #[must_use]
    pub fn module(&self, id: &ModuleId) -> Option<&Module> {
        self.modules.iter().find(|m| m.id() == id)
    }
}

//
// ─── DRAFTS ────────────────────────────────────────────────────────────────────
//

/// Declarative curriculum definition, as written in data files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurriculumDraft {
    pub course_id: String,
    pub title: String,
    #[serde(default)]
    pub modules: Vec<ModuleDraft>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleDraft {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub items: Vec<ItemDraft>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemDraft {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    #[serde(default)]
    pub path: String,
}

impl CurriculumDraft {
    /// Validate the draft into an immutable curriculum.
    ///
    /// # Errors
    ///
    /// Returns `CurriculumError` for invalid ids, blank titles, or duplicate
    /// module/item ids.
    pub fn validate(self) -> Result<Curriculum, CurriculumError> {
        let course_id = CourseId::new(&self.course_id)?;
        let title = self.title.trim().to_owned();
        if title.is_empty() {
            return Err(CurriculumError::EmptyCourseTitle);
        }

        let mut module_ids = HashSet::new();
        let mut item_ids = HashSet::new();
        let mut modules = Vec::with_capacity(self.modules.len());

        for module in self.modules {
            let module_id = ModuleId::new(&module.id)?;
            if !module_ids.insert(module_id.clone()) {
                return Err(CurriculumError::DuplicateModule(module_id));
            }
            let module_title = module.title.trim().to_owned();
            if module_title.is_empty() {
                return Err(CurriculumError::EmptyModuleTitle(module_id));
            }

            let mut items = Vec::with_capacity(module.items.len());
            for item in module.items {
                let item_id = ItemId::new(&item.id)?;
                if !item_ids.insert(item_id.clone()) {
                    return Err(CurriculumError::DuplicateItem(item_id));
                }
                let item_title = item.title.trim().to_owned();
                if item_title.is_empty() {
                    return Err(CurriculumError::EmptyItemTitle(item_id));
                }
                items.push(CurriculumItem {
                    id: item_id,
                    title: item_title,
                    kind: item.kind,
                    target: item.path.trim().to_owned(),
                    module_id: module_id.clone(),
                });
            }

            modules.push(Module {
                id: module_id,
                title: module_title,
                items,
            });
        }

        Ok(Curriculum {
            course_id,
            title,
            modules,
        })
    }
}

impl ItemDraft {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        kind: ItemKind,
        path: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            kind,
            path: path.into(),
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> CurriculumDraft {
        CurriculumDraft {
            course_id: "demo".into(),
            title: "Demo".into(),
            modules: vec![
                ModuleDraft {
                    id: "m1".into(),
                    title: "One".into(),
                    items: vec![
                        ItemDraft::new("a", "A", ItemKind::Lesson, "/a"),
                        ItemDraft::new("b", "B", ItemKind::Exercise, "/b"),
                    ],
                },
                ModuleDraft {
                    id: "m2".into(),
                    title: "Two".into(),
                    items: vec![ItemDraft::new("c", "C", ItemKind::Assessment, "/c")],
                },
            ],
        }
    }

    #[test]
    fn global_order_is_module_then_item_order() {
        let curriculum = draft().validate().unwrap();
        let ids: Vec<&str> = curriculum.items().map(|i| i.id().as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(curriculum.item_count(), 3);
        assert_eq!(curriculum.item(&ItemId::new("c").unwrap()).unwrap().module_id().as_str(), "m2");
    }

    #[test]
    fn rejects_duplicate_item_across_modules() {
        let mut d = draft();
        d.modules[1].items.push(ItemDraft::new("a", "Again", ItemKind::Lesson, ""));
        let err = d.validate().unwrap_err();
        assert_eq!(err, CurriculumError::DuplicateItem(ItemId::new("a").unwrap()));
    }

    #[test]
    fn rejects_duplicate_module() {
        let mut d = draft();
        d.modules[1].id = "m1".into();
        assert!(matches!(d.validate(), Err(CurriculumError::DuplicateModule(_))));
    }

    #[test]
    fn rejects_blank_titles() {
        let mut d = draft();
        d.title = "  ".into();
        assert_eq!(d.validate().unwrap_err(), CurriculumError::EmptyCourseTitle);

        let mut d = draft();
        d.modules[0].items[0].title = String::new();
        assert!(matches!(d.validate(), Err(CurriculumError::EmptyItemTitle(_))));
    }

    #[test]
    fn parses_json_definition() {
        let json = r#"{
            "courseId": "js-basics",
            "title": "JavaScript",
            "modules": [
                { "id": "m1", "title": "Start", "items": [
                    { "id": "j1", "title": "Hello", "type": "lesson", "path": "/j1" },
                    { "id": "j2", "title": "Build", "type": "project" }
                ]}
            ]
        }"#;
        let draft: CurriculumDraft = serde_json::from_str(json).unwrap();
        let curriculum = draft.validate().unwrap();
        assert_eq!(curriculum.course_id().as_str(), "js-basics");
        let kinds: Vec<ItemKind> = curriculum.items().map(CurriculumItem::kind).collect();
        assert_eq!(kinds, [ItemKind::Lesson, ItemKind::Project]);
    }
}
