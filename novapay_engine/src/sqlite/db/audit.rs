use chrono::Utc;
use sqlx::SqliteConnection;

use crate::db_types::{AuditRecord, AuditSessionSummary, NewAuditRecord};

pub async fn create_session(
    session_id: &str,
    label: &str,
    context: Option<serde_json::Value>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            INSERT INTO audit_sessions (session_id, label, context, started_at)
            VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(session_id)
    .bind(label)
    .bind(context.map(|c| c.to_string()))
    .bind(Utc::now())
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn insert_record(record: NewAuditRecord, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            INSERT INTO audit_records (session_id, seq, ts, stage, depth, message, payload)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(record.session_id)
    .bind(record.seq)
    .bind(Utc::now())
    .bind(record.stage)
    .bind(record.depth)
    .bind(record.message)
    .bind(record.payload.map(|p| p.to_string()))
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn finalize_session(
    session_id: &str,
    final_status: &str,
    error: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            UPDATE audit_sessions SET ended_at = $2, final_status = $3, error = $4
            WHERE session_id = $1
        "#,
    )
    .bind(session_id)
    .bind(Utc::now())
    .bind(final_status)
    .bind(error)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn records_for_session(
    session_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<AuditRecord>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM audit_records WHERE session_id = $1 ORDER BY seq ASC")
        .bind(session_id)
        .fetch_all(conn)
        .await
}

pub async fn search_records(needle: &str, conn: &mut SqliteConnection) -> Result<Vec<AuditRecord>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM audit_records WHERE message LIKE $1 ORDER BY id DESC")
        .bind(format!("%{needle}%"))
        .fetch_all(conn)
        .await
}

pub async fn fetch_session(
    session_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<AuditSessionSummary>, sqlx::Error> {
    sqlx::query_as(
        r#"
            SELECT session_id, label, started_at, ended_at, final_status, error
            FROM audit_sessions WHERE session_id = $1
        "#,
    )
    .bind(session_id)
    .fetch_optional(conn)
    .await
}
