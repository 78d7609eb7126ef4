//! `SqliteDatabase` is a concrete implementation of a NovaPay callback engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements both storage traits defined in the
//! [`crate::traits`] module: the order store and the audit store share one pool.
use std::fmt::Debug;

use sqlx::SqlitePool;

use super::db::{audit, new_pool, orders};
use crate::{
    db_types::{AuditRecord, AuditSessionSummary, NewAuditRecord, NewOrder, Order, OrderId},
    traits::{
        AuditStore,
        AuditStoreError,
        GatewayDatabase,
        GatewayStorageError,
        OrderTransition,
        TransitionOutcome,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, GatewayStorageError> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<(), GatewayStorageError> {
        sqlx::migrate!("./src/sqlite/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| GatewayStorageError::DatabaseError(e.to_string()))
    }
}

impl GatewayDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order(&self, order: NewOrder) -> Result<(Order, bool), GatewayStorageError> {
        let mut tx = self.pool.begin().await?;
        let (order, inserted) = orders::idempotent_insert(order, &mut tx).await?;
        tx.commit().await?;
        Ok((order, inserted))
    }

    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, GatewayStorageError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_order_id(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn apply_transition(&self, transition: OrderTransition) -> Result<TransitionOutcome, GatewayStorageError> {
        let mut tx = self.pool.begin().await?;
        let outcome = orders::conditional_transition(transition, &mut tx).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    async fn close(&mut self) -> Result<(), GatewayStorageError> {
        self.pool.close().await;
        Ok(())
    }
}

impl AuditStore for SqliteDatabase {
    async fn create_session(
        &self,
        session_id: &str,
        label: &str,
        context: Option<serde_json::Value>,
    ) -> Result<(), AuditStoreError> {
        let mut conn = self.pool.acquire().await?;
        audit::create_session(session_id, label, context, &mut conn).await?;
        Ok(())
    }

    async fn append_record(&self, record: NewAuditRecord) -> Result<(), AuditStoreError> {
        let mut conn = self.pool.acquire().await?;
        audit::insert_record(record, &mut conn).await?;
        Ok(())
    }

    async fn finalize_session(
        &self,
        session_id: &str,
        final_status: &str,
        error: Option<String>,
    ) -> Result<(), AuditStoreError> {
        let mut conn = self.pool.acquire().await?;
        audit::finalize_session(session_id, final_status, error, &mut conn).await?;
        Ok(())
    }

    async fn records_for_session(&self, session_id: &str) -> Result<Vec<AuditRecord>, AuditStoreError> {
        let mut conn = self.pool.acquire().await?;
        let records = audit::records_for_session(session_id, &mut conn).await?;
        Ok(records)
    }

    async fn search_records(&self, needle: &str) -> Result<Vec<AuditRecord>, AuditStoreError> {
        let mut conn = self.pool.acquire().await?;
        let records = audit::search_records(needle, &mut conn).await?;
        Ok(records)
    }

    async fn fetch_session(&self, session_id: &str) -> Result<Option<AuditSessionSummary>, AuditStoreError> {
        let mut conn = self.pool.acquire().await?;
        let session = audit::fetch_session(session_id, &mut conn).await?;
        Ok(session)
    }
}
