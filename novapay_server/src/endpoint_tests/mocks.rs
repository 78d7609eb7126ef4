use mockall::mock;
use novapay_engine::{
    db_types::{AuditRecord, AuditSessionSummary, NewAuditRecord, NewOrder, Order, OrderId},
    traits::{AuditStore, AuditStoreError, GatewayDatabase, GatewayStorageError, OrderTransition, TransitionOutcome},
};

mock! {
    pub Backend {}

    impl Clone for Backend {
        fn clone(&self) -> Self;
    }

    impl GatewayDatabase for Backend {
        fn url(&self) -> &str;
        async fn insert_order(&self, order: NewOrder) -> Result<(Order, bool), GatewayStorageError>;
        async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, GatewayStorageError>;
        async fn apply_transition(&self, transition: OrderTransition) -> Result<TransitionOutcome, GatewayStorageError>;
        async fn close(&mut self) -> Result<(), GatewayStorageError>;
    }

    impl AuditStore for Backend {
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
        async fn records_for_session(&self, session_id: &str) -> Result<Vec<AuditRecord>, AuditStoreError>;
        async fn search_records(&self, needle: &str) -> Result<Vec<AuditRecord>, AuditStoreError>;
        async fn fetch_session(&self, session_id: &str) -> Result<Option<AuditSessionSummary>, AuditStoreError>;
    }
}

/// An audit backend that accepts every write. The pipeline audits unconditionally, so every endpoint test needs
/// one; none of them assert on it.
pub fn permissive_audit_backend() -> MockBackend {
    let mut store = MockBackend::new();
    store.expect_create_session().returning(|_, _, _| Ok(()));
    store.expect_clone().returning(|| {
        let mut session_store = MockBackend::new();
        session_store.expect_append_record().returning(|_| Ok(()));
        session_store.expect_finalize_session().returning(|_, _, _| Ok(()));
        session_store
    });
    store
}
