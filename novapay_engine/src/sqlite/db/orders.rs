use chrono::Utc;
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewOrder, Order, OrderId},
    traits::{GatewayStorageError, OrderTransition, TransitionOutcome},
};

/// Inserts the order into the database, returning `false` in the second parameter if the order already exists.
pub async fn idempotent_insert(
    order: NewOrder,
    conn: &mut SqliteConnection,
) -> Result<(Order, bool), GatewayStorageError> {
    let inserted = match fetch_order_by_order_id(&order.order_id, conn).await? {
        Some(order) => (order, false),
        None => {
            let order = insert_order(order, conn).await?;
            debug!("🗃️ Order [{}] inserted with id {}", order.order_id, order.id);
            (order, true)
        },
    };
    Ok(inserted)
}

async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, GatewayStorageError> {
    let order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_id,
                total_price,
                currency,
                memo,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING *;
        "#,
    )
    .bind(order.order_id)
    .bind(order.total_price.value())
    .bind(order.currency)
    .bind(order.memo)
    .bind(order.created_at)
    .fetch_one(conn)
    .await?;
    Ok(order)
}

/// Returns the entry in the orders table for the corresponding `order_id`
pub async fn fetch_order_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order =
        sqlx::query_as("SELECT * FROM orders WHERE order_id = $1").bind(order_id.as_str()).fetch_optional(conn).await?;
    Ok(order)
}

/// Applies an [`OrderTransition`] with the idempotence and terminal-state guards embedded in the update statement
/// itself, so the check-and-set is a single atomic write. Concurrent duplicates of the same callback collapse to
/// one applied row; everyone else observes the post-state and is classified from it.
pub async fn conditional_transition(
    transition: OrderTransition,
    conn: &mut SqliteConnection,
) -> Result<TransitionOutcome, GatewayStorageError> {
    let rows = sqlx::query(
        r#"
            UPDATE orders SET
                status = $1,
                paid_amount = COALESCE($2, paid_amount),
                fee = COALESCE($3, fee),
                last_txid = COALESCE($4, last_txid),
                memo = COALESCE($5, memo),
                updated_at = $6
            WHERE order_id = $7
              AND status IN ('New', 'Processing', 'OnHold')
              AND ($4 IS NULL OR last_txid IS NULL OR last_txid <> $4)
        "#,
    )
    .bind(transition.target_status)
    .bind(transition.paid_amount.map(|m| m.value()))
    .bind(transition.fee.map(|m| m.value()))
    .bind(transition.txid.clone())
    .bind(transition.memo.clone())
    .bind(Utc::now())
    .bind(transition.order_id.as_str().to_string())
    .execute(&mut *conn)
    .await?
    .rows_affected();

    let order = fetch_order_by_order_id(&transition.order_id, conn)
        .await?
        .ok_or_else(|| GatewayStorageError::OrderNotFound(transition.order_id.clone()))?;
    if rows == 1 {
        debug!("🗃️ Order [{}] transitioned to {}", order.order_id, order.status);
        return Ok(TransitionOutcome::Applied(order));
    }
    // The guarded update matched nothing; classify from the order as it stands now.
    if transition.txid.is_some() && order.last_txid == transition.txid {
        Ok(TransitionOutcome::AlreadyApplied(order))
    } else {
        Ok(TransitionOutcome::Superseded(order))
    }
}
