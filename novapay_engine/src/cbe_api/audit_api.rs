use crate::{
    db_types::{AuditRecord, AuditSessionSummary},
    traits::{AuditStore, AuditStoreError},
};

/// Read-only operator access to the audit trail. Query by callback session id, or free-text match across record
/// messages. This API shares no code path with the verification pipeline; reporting tools consume it without
/// touching callback processing.
pub struct AuditApi<B> {
    store: B,
}

impl<B> AuditApi<B>
where B: AuditStore
{
    pub fn new(store: B) -> Self {
        Self { store }
    }

    /// The full replayable trace for one callback request, in write order.
    pub async fn records_for_session(&self, session_id: &str) -> Result<Vec<AuditRecord>, AuditStoreError> {
        self.store.records_for_session(session_id).await
    }

    /// Free-text search across record messages, newest first.
    pub async fn search_messages(&self, needle: &str) -> Result<Vec<AuditRecord>, AuditStoreError> {
        self.store.search_records(needle).await
    }

    pub async fn session_summary(&self, session_id: &str) -> Result<Option<AuditSessionSummary>, AuditStoreError> {
        self.store.fetch_session(session_id).await
    }
}
