use thiserror::Error;

use crate::db_types::{AuditRecord, AuditSessionSummary, NewAuditRecord};

/// Append-only audit trail contract.
///
/// Writes must be durable and cheap; they happen on every pipeline stage boundary. Records are immutable once
/// written. The read methods are the operator forensic contract; nothing in the callback path depends on them.
#[allow(async_fn_in_trait)]
pub trait AuditStore: Clone {
    async fn create_session(
        &self,
        session_id: &str,
        label: &str,
        context: Option<serde_json::Value>,
    ) -> Result<(), AuditStoreError>;

    async fn append_record(&self, record: NewAuditRecord) -> Result<(), AuditStoreError>;

    async fn finalize_session(
        &self,
        session_id: &str,
        final_status: &str,
        error: Option<String>,
    ) -> Result<(), AuditStoreError>;

    /// All records for one callback session, ordered by sequence number.
    async fn records_for_session(&self, session_id: &str) -> Result<Vec<AuditRecord>, AuditStoreError>;

    /// Free-text search across record messages, newest first.
    async fn search_records(&self, needle: &str) -> Result<Vec<AuditRecord>, AuditStoreError>;

    async fn fetch_session(&self, session_id: &str) -> Result<Option<AuditSessionSummary>, AuditStoreError>;
}

#[derive(Debug, Clone, Error)]
pub enum AuditStoreError {
    #[error("We have an internal database engine error (configuration/uptime etc.): {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for AuditStoreError {
    fn from(e: sqlx::Error) -> Self {
        AuditStoreError::DatabaseError(e.to_string())
    }
}
