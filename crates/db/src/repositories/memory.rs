use std::collections::HashMap;

use tokio::sync::RwLock;

use haggle_core::domain::call_record::{CallRecord, CallRecordPatch};
use haggle_core::ports::{CallRecordStore, CollaboratorError};

/// Process-local call history used when no database is configured and in tests.
#[derive(Default)]
pub struct InMemoryCallRecordRepository {
    records: RwLock<HashMap<String, CallRecord>>,
}

#[async_trait::async_trait]
impl CallRecordStore for InMemoryCallRecordRepository {
    async fn create(&self, record: CallRecord) -> Result<(), CollaboratorError> {
        let mut records = self.records.write().await;
        records.insert(record.call_id.clone(), record);
        Ok(())
    }

    async fn get(&self, call_id: &str) -> Result<Option<CallRecord>, CollaboratorError> {
        let records = self.records.read().await;
        Ok(records.get(call_id).cloned())
    }

    async fn update(
        &self,
        call_id: &str,
        patch: CallRecordPatch,
    ) -> Result<Option<CallRecord>, CollaboratorError> {
        let mut records = self.records.write().await;
        Ok(records.get_mut(call_id).map(|record| {
            record.apply(patch);
            record.clone()
        }))
    }

    async fn delete(&self, call_id: &str) -> Result<bool, CollaboratorError> {
        let mut records = self.records.write().await;
        Ok(records.remove(call_id).is_some())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<CallRecord>, CollaboratorError> {
        let records = self.records.read().await;
        let mut recent: Vec<CallRecord> = records.values().cloned().collect();
        recent.sort_by(|left, right| {
            right.created_at.cmp(&left.created_at).then_with(|| left.call_id.cmp(&right.call_id))
        });
        recent.truncate(limit);
        Ok(recent)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use haggle_core::domain::call_record::{CallRecordPatch, CallState};
    use haggle_core::ports::CallRecordStore;

    use super::InMemoryCallRecordRepository;
    use crate::repositories::call_record::tests::record;

    #[tokio::test]
    async fn lists_newest_first_and_applies_patches() {
        let repo = InMemoryCallRecordRepository::default();
        let mut older = record("call-1");
        older.created_at = Utc::now() - Duration::minutes(5);
        repo.create(older).await.expect("create");
        repo.create(record("call-2")).await.expect("create");

        let recent = repo.list_recent(10).await.expect("list");
        assert_eq!(
            recent.iter().map(|r| r.call_id.as_str()).collect::<Vec<_>>(),
            vec!["call-2", "call-1"]
        );
        assert_eq!(repo.list_recent(1).await.expect("list").len(), 1);

        let patched = repo
            .update(
                "call-1",
                CallRecordPatch { status: Some(CallState::Failed), ..CallRecordPatch::default() },
            )
            .await
            .expect("update")
            .expect("exists");
        assert_eq!(patched.status, CallState::Failed);
        assert!(repo.update("missing", CallRecordPatch::default()).await.expect("ok").is_none());

        assert!(repo.delete("call-1").await.expect("delete"));
        assert!(repo.get("call-1").await.expect("get").is_none());
    }
}
