use crate::QaError;
use records::{AnswerRecord, DocumentRef};
use std::sync::Arc;
use tracing::{debug, warn};
use traits::PreferenceStore;

pub const HISTORY_KEY_PREFIX: &str = "extensions.pdf-qa-helper.history.";

pub fn history_key(doc: &DocumentRef) -> String {
    format!("{HISTORY_KEY_PREFIX}{doc}")
}

/// Sole writer of per-document answer history.
///
/// Holds one record per document; each save replaces the previous one.
/// Nothing is cached, every call goes to the preference store.
#[derive(Clone)]
pub struct HistoryStore {
    prefs: Arc<dyn PreferenceStore>,
}

impl HistoryStore {
    pub fn new(prefs: Arc<dyn PreferenceStore>) -> Self {
        Self { prefs }
    }

    /// Best effort. A failed write is logged and otherwise ignored.
    pub async fn save(&self, doc: &DocumentRef, record: &AnswerRecord) {
        let key = history_key(doc);
        let raw = match serde_json::to_string(record) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(%doc, error = %e, "history: could not serialize record");
                return;
            }
        };
        match self.prefs.set(&key, &raw).await {
            Ok(()) => debug!(%doc, timestamp = record.timestamp, "history: saved"),
            Err(e) => warn!(%doc, error = %e, "history: save failed"),
        }
    }

    /// Returns `Ok(None)` when nothing is stored or the stored value is corrupt.
    pub async fn load(&self, doc: &DocumentRef) -> Result<Option<AnswerRecord>, QaError> {
        let key = history_key(doc);
        let raw = self
            .prefs
            .get(&key)
            .await
            .map_err(QaError::PersistenceFailure)?;
        let Some(raw) = raw.filter(|raw| !raw.trim().is_empty()) else {
            return Ok(None);
        };
        match serde_json::from_str::<AnswerRecord>(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(%doc, error = %e, "history: ignoring corrupt record");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryPreferences;
    use crate::testing::MockPrefs;

    fn record(question: &str, answer: &str, timestamp: i64) -> AnswerRecord {
        AnswerRecord {
            question: question.to_string(),
            answer: answer.to_string(),
            timestamp,
        }
    }

    #[tokio::test]
    async fn test_missing_record_is_none() {
        let history = HistoryStore::new(Arc::new(MemoryPreferences::new()));
        let loaded = history.load(&DocumentRef::from("1")).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_save_overwrites_previous_record() {
        let prefs = Arc::new(MemoryPreferences::new());
        let history = HistoryStore::new(prefs.clone());
        let doc = DocumentRef::from("1");

        history.save(&doc, &record("q1", "a1", 10)).await;
        history.save(&doc, &record("q2", "a2", 20)).await;

        let loaded = history.load(&doc).await.unwrap();
        assert_eq!(loaded, Some(record("q2", "a2", 20)));
        assert_eq!(prefs.snapshot().len(), 1);
        assert!(prefs.snapshot().contains_key("extensions.pdf-qa-helper.history.1"));
    }

    #[tokio::test]
    async fn test_records_are_keyed_per_document() {
        let history = HistoryStore::new(Arc::new(MemoryPreferences::new()));
        history.save(&DocumentRef::from("1"), &record("q1", "a1", 1)).await;

        assert!(history.load(&DocumentRef::from("2")).await.unwrap().is_none());
        assert!(history.load(&DocumentRef::from("1")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_corrupt_record_reads_as_absent() {
        let prefs = MemoryPreferences::with_values([(
            "extensions.pdf-qa-helper.history.1",
            "{not json",
        )]);
        let history = HistoryStore::new(Arc::new(prefs));
        let loaded = history.load(&DocumentRef::from("1")).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_failed_save_is_swallowed() {
        let mut prefs = MockPrefs::new();
        prefs
            .expect_set()
            .times(1)
            .returning(|_, _| Err("disk full".to_string()));
        let history = HistoryStore::new(Arc::new(prefs));

        // Must return normally.
        history.save(&DocumentRef::from("1"), &record("q", "a", 1)).await;
    }

    #[tokio::test]
    async fn test_failed_read_is_persistence_failure() {
        let mut prefs = MockPrefs::new();
        prefs
            .expect_get()
            .returning(|_| Err("locked".to_string()));
        let history = HistoryStore::new(Arc::new(prefs));

        let err = history.load(&DocumentRef::from("1")).await.unwrap_err();
        assert_eq!(err, QaError::PersistenceFailure("locked".to_string()));
    }
}
