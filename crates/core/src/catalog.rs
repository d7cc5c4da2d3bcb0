use std::collections::BTreeMap;

use thiserror::Error;

use crate::model::{
    CourseId, Curriculum, CurriculumDraft, CurriculumError, CurriculumItem, ItemDraft, ItemKind,
    Module, ModuleDraft,
};

/// Slug of the course shipped with the catalog.
pub const HTML_FUNDAMENTALS: &str = "html-fundamentals";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CatalogError {
    #[error("course not found: {0}")]
    NotFound(CourseId),

    #[error(transparent)]
    Curriculum(#[from] CurriculumError),

    #[error("invalid curriculum definition: {0}")]
    Parse(String),
}

/// Read-only lookup of curricula by course id.
#[derive(Debug, Clone, Default)]
pub struct CurriculumCatalog {
    courses: BTreeMap<CourseId, Curriculum>,
}

impl CurriculumCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog holding the built-in courses.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Curriculum` if a built-in definition is invalid.
    pub fn builtin() -> Result<Self, CatalogError> {
        let mut catalog = Self::new();
        catalog.insert(html_fundamentals().validate()?);
        Ok(catalog)
    }

    /// Add the curricula declared in a JSON document.
    ///
    /// Accepts either a single definition or an array of them. A definition
    /// whose course id is already present replaces the existing one.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Parse` for malformed JSON and
    /// `CatalogError::Curriculum` if any definition fails validation.
    pub fn extend_from_json(&mut self, json: &str) -> Result<usize, CatalogError> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| CatalogError::Parse(e.to_string()))?;
        let drafts: Vec<CurriculumDraft> = if value.is_array() {
            serde_json::from_value(value)
        } else {
            serde_json::from_value(value).map(|draft| vec![draft])
        }
        .map_err(|e| CatalogError::Parse(e.to_string()))?;

        let curricula = drafts
            .into_iter()
            .map(CurriculumDraft::validate)
            .collect::<Result<Vec<_>, _>>()?;
        let added = curricula.len();
        for curriculum in curricula {
            self.insert(curriculum);
        }
        Ok(added)
    }

    pub fn insert(&mut self, curriculum: Curriculum) {
        self.courses
            .insert(curriculum.course_id().clone(), curriculum);
    }

    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` for an unknown course.
    pub fn get(&self, course: &CourseId) -> Result<&Curriculum, CatalogError> {
        self.courses
            .get(course)
            .ok_or_else(|| CatalogError::NotFound(course.clone()))
    }

    /// Items of a course in global traversal order.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` for an unknown course.
    pub fn items(&self, course: &CourseId) -> Result<Vec<&CurriculumItem>, CatalogError> {
        Ok(self.get(course)?.items().collect())
    }

    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` for an unknown course.
    pub fn modules(&self, course: &CourseId) -> Result<&[Module], CatalogError> {
        Ok(self.get(course)?.modules())
    }

    pub fn courses(&self) -> impl Iterator<Item = &Curriculum> {
        self.courses.values()
    }

    #[must_use]
    pub fn contains(&self, course: &CourseId) -> bool {
        self.courses.contains_key(course)
    }
}

fn html_fundamentals() -> CurriculumDraft {
    CurriculumDraft {
        course_id: HTML_FUNDAMENTALS.into(),
        title: "HTML & CSS Fundamentals".into(),
        modules: vec![
            ModuleDraft {
                id: "m1".into(),
                title: "MODULE 1 — Getting Started".into(),
                items: vec![
                    ItemDraft::new(
                        "l1",
                        "Welcome to HTML & CSS",
                        ItemKind::Lesson,
                        "/html-css/lessons/welcome",
                    ),
                    ItemDraft::new(
                        "l2",
                        "HTML Basics Part 1",
                        ItemKind::Lesson,
                        "/html-css/lessons/basics-1",
                    ),
                    ItemDraft::new(
                        "l3",
                        "HTML Basics Part 2",
                        ItemKind::Lesson,
                        "/html-css/lessons/basics-2",
                    ),
                ],
            },
            ModuleDraft {
                id: "m2".into(),
                title: "MODULE 2 — Practice & Exercises".into(),
                items: vec![ItemDraft::new(
                    "l4",
                    "HTML Exercises",
                    ItemKind::Exercise,
                    "/html-css/exercises/1",
                )],
            },
            ModuleDraft {
                id: "m3".into(),
                title: "MODULE 3 — Assessment".into(),
                items: vec![
                    ItemDraft::new(
                        "l5",
                        "Quiz - HTML Basics",
                        ItemKind::Assessment,
                        "/html-css/quiz/1",
                    ),
                    ItemDraft::new(
                        "l6",
                        "Quiz 2 - Advanced Topics",
                        ItemKind::Assessment,
                        "/html-css/quiz/2",
                    ),
                ],
            },
        ],
    }
}
