//! Serialized ledger shape: `{ "<itemId>": { "completed": true, "completedAt": "<ISO-8601>" } }`.
//!
//! Entries that do not parse, or that are not marked completed, are skipped
//! rather than failing the whole ledger.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use progress_core::model::{ItemId, ProgressLedger};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::repository::StorageError;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredCompletion {
    completed: bool,
    completed_at: DateTime<Utc>,
}

/// # Errors
///
/// Returns `StorageError::Serialization` if JSON encoding fails.
pub fn encode(ledger: &ProgressLedger) -> Result<String, StorageError> {
    let stored: BTreeMap<&str, StoredCompletion> = ledger
        .records()
        .map(|record| {
            (
                record.item_id.as_str(),
                StoredCompletion {
                    completed: true,
                    completed_at: record.completed_at,
                },
            )
        })
        .collect();
    serde_json::to_string(&stored).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// # Errors
///
/// Returns `StorageError::Serialization` if the value is not a JSON object.
pub fn decode(raw: &str) -> Result<ProgressLedger, StorageError> {
    let entries: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(raw).map_err(|e| StorageError::Serialization(e.to_string()))?;

    let mut ledger = ProgressLedger::new();
    for (key, value) in entries {
        let item_id = match ItemId::new(&key) {
            Ok(id) => id,
            Err(err) => {
                warn!(item = %key, error = %err, "skipping stored record with invalid item id");
                continue;
            }
        };
        match serde_json::from_value::<StoredCompletion>(value) {
            Ok(stored) if stored.completed => {
                ledger.record(item_id, stored.completed_at);
            }
            Ok(_) => {}
            Err(err) => {
                warn!(item = %item_id, error = %err, "skipping malformed stored record");
            }
        }
    }
    Ok(ledger)
}

#[cfg(test)]
mod tests {
    use super::*;
    use progress_core::time::fixed_now;

    #[test]
    fn encodes_camel_case_shape() {
        let mut ledger = ProgressLedger::new();
        ledger.record(ItemId::new("l1").unwrap(), fixed_now());

        let json = encode(&ledger).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["l1"]["completed"], serde_json::Value::Bool(true));
        assert!(value["l1"]["completedAt"].as_str().unwrap().starts_with("2023-11-14T22:13:20"));
        assert_eq!(decode(&json).unwrap(), ledger);
    }

    #[test]
    fn reads_browser_timestamps() {
        let raw = r#"{ "l2": { "completed": true, "completedAt": "2024-03-01T10:15:30.123Z" } }"#;
        let ledger = decode(raw).unwrap();
        assert!(ledger.contains(&ItemId::new("l2").unwrap()));
    }

    #[test]
    fn skips_malformed_and_incomplete_entries() {
        let raw = r#"{
            "ok": { "completed": true, "completedAt": "2024-03-01T10:15:30Z" },
            "not-done": { "completed": false, "completedAt": "2024-03-01T10:15:30Z" },
            "no-date": { "completed": true },
            "bad:id": { "completed": true, "completedAt": "2024-03-01T10:15:30Z" },
            "garbage": 7
        }"#;
        let ledger = decode(raw).unwrap();
        assert_eq!(ledger.item_ids(), [ItemId::new("ok").unwrap()].into_iter().collect());
    }

    #[test]
    fn rejects_non_object_ledger() {
        assert!(matches!(decode("[1,2]"), Err(StorageError::Serialization(_))));
        assert!(matches!(decode("not json"), Err(StorageError::Serialization(_))));
    }
}
