mod curriculum;
mod ids;
mod lesson;
mod progress;

pub use curriculum::{
    Curriculum, CurriculumDraft, CurriculumError, CurriculumItem, ItemDraft, ItemKind, Module,
    ModuleDraft,
};
pub use ids::{CourseId, IdError, ItemId, KEY_SEPARATOR, ModuleId, UserId};
pub use lesson::{LessonBook, LessonState, LessonStatus, OPENED_PERCENT};
pub use progress::{CompletionRecord, ProgressLedger, Scope};
