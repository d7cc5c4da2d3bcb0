//! Serialized lesson store shape:
//! `{ "<lessonId>": { "percent": 10, "status": "in_progress", "updated_at": "<ISO-8601>" } }`.

use std::collections::BTreeMap;

use progress_core::model::{ItemId, LessonBook, LessonState};
use tracing::warn;

use crate::repository::StorageError;

/// # Errors
///
/// Returns `StorageError::Serialization` if JSON encoding fails.
pub fn encode(book: &LessonBook) -> Result<String, StorageError> {
    let stored: BTreeMap<&str, &LessonState> =
        book.iter().map(|(lesson, state)| (lesson.as_str(), state)).collect();
    serde_json::to_string(&stored).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// # Errors
///
/// Returns `StorageError::Serialization` if the value is not a JSON object.
pub fn decode(raw: &str) -> Result<LessonBook, StorageError> {
    let entries: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(raw).map_err(|e| StorageError::Serialization(e.to_string()))?;

    let mut book = LessonBook::new();
    for (key, value) in entries {
        let Ok(lesson) = ItemId::new(&key) else {
            warn!(lesson = %key, "skipping lesson state with invalid id");
            continue;
        };
        match serde_json::from_value::<LessonState>(value) {
            Ok(state) => book.set(lesson, LessonState::new(state.percent, state.status, state.updated_at)),
            Err(err) => warn!(lesson = %lesson, error = %err, "skipping malformed lesson state"),
        }
    }
    Ok(book)
}

#[cfg(test)]
mod tests {
    use super::*;
    use progress_core::model::LessonStatus;
    use progress_core::time::fixed_now;

    #[test]
    fn writes_snake_case_fields() {
        let mut book = LessonBook::new();
        book.open(ItemId::new("html-1").unwrap(), fixed_now());

        let value: serde_json::Value = serde_json::from_str(&encode(&book).unwrap()).unwrap();
        assert_eq!(value["html-1"]["percent"], 10);
        assert_eq!(value["html-1"]["status"], "in_progress");
        assert!(value["html-1"]["updated_at"].is_string());
    }

    #[test]
    fn keeps_good_entries_next_to_bad_ones() {
        let raw = r#"{
            "a": { "percent": 100, "status": "completed", "updated_at": "2024-03-01T10:15:30.5Z" },
            "b": { "percent": 10, "status": "paused", "updated_at": "2024-03-01T10:15:30Z" },
            "c": { "percent": 150, "status": "in_progress", "updated_at": "2024-03-01T10:15:30Z" },
            "bad:id": { "percent": 10, "status": "in_progress", "updated_at": "2024-03-01T10:15:30Z" }
        }"#;
        let book = decode(raw).unwrap();
        assert_eq!(book.len(), 2);
        assert_eq!(
            book.get(&ItemId::new("a").unwrap()).unwrap().status,
            LessonStatus::Completed
        );
        assert_eq!(book.get(&ItemId::new("c").unwrap()).unwrap().percent, 100);
        assert!(decode("[]").is_err());
    }
}
