use thiserror::Error;

use crate::{
    db_types::{NewOrder, Order, OrderId},
    traits::data_objects::{OrderTransition, TransitionOutcome},
};

/// The order store contract for callback engine backends.
#[allow(async_fn_in_trait)]
pub trait GatewayDatabase: Clone {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Takes a new order, and in a single atomic transaction, stores the order in the database.
    /// This call is idempotent.
    /// Returns the stored order, and `true` if it was inserted or `false` if it already existed.
    async fn insert_order(&self, order: NewOrder) -> Result<(Order, bool), GatewayStorageError>;

    /// Fetch the order with the given merchant order number, or `None` if no such order exists. Order numbers are
    /// unique, so more than one match is impossible by construction.
    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, GatewayStorageError>;

    /// Apply an [`OrderTransition`] atomically.
    ///
    /// The idempotence check and the status update happen inside one transaction, with the guard conditions
    /// embedded in the update statement itself, so concurrent duplicates of the same callback collapse to one
    /// `Applied` and the rest `AlreadyApplied`. Orders already in a terminal state are never mutated.
    async fn apply_transition(&self, transition: OrderTransition) -> Result<TransitionOutcome, GatewayStorageError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), GatewayStorageError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum GatewayStorageError {
    #[error("We have an internal database engine error (configuration/uptime etc.): {0}")]
    DatabaseError(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
}

impl From<sqlx::Error> for GatewayStorageError {
    fn from(e: sqlx::Error) -> Self {
        GatewayStorageError::DatabaseError(e.to_string())
    }
}
