use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::error;
use npg_common::{Money, DEFAULT_CURRENCY_CODE};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

//--------------------------------------        OrderId        ---------------------------------------------------------
/// The merchant-assigned order number. This is the identifier the platform echoes back as `merchantOrderNo` in
/// callbacks, and is unique across all local orders.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderStatusType {
    /// The order has been created and no callback has been applied yet.
    New,
    /// A payment attempt is underway on the platform side.
    Processing,
    /// The platform reported a 3-DS challenge; the shopper must complete it before a final callback arrives.
    OnHold,
    /// The order has been paid in full.
    Completed,
    /// The platform reported a failed payment.
    Failed,
    /// The order has been cancelled.
    Cancelled,
}

impl OrderStatusType {
    /// Terminal states absorb; no callback may move an order out of them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatusType::Completed | OrderStatusType::Failed | OrderStatusType::Cancelled)
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatusType::New => write!(f, "New"),
            OrderStatusType::Processing => write!(f, "Processing"),
            OrderStatusType::OnHold => write!(f, "OnHold"),
            OrderStatusType::Completed => write!(f, "Completed"),
            OrderStatusType::Failed => write!(f, "Failed"),
            OrderStatusType::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl From<String> for OrderStatusType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to New");
            OrderStatusType::New
        })
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid order status: {0}")]
pub struct ConversionError(String);

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "New" => Ok(Self::New),
            "Processing" => Ok(Self::Processing),
            "OnHold" => Ok(Self::OnHold),
            "Completed" => Ok(Self::Completed),
            "Failed" => Ok(Self::Failed),
            "Cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

//--------------------------------------        Order        ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    pub total_price: Money,
    pub currency: String,
    /// The amount the platform reported as actually paid, once a SUCCESS callback has been applied.
    pub paid_amount: Option<Money>,
    /// The platform fee reported with a SUCCESS callback.
    pub fee: Option<Money>,
    /// Idempotence marker: the `platformOrderNo` of the last callback applied to this order.
    pub last_txid: Option<String>,
    pub memo: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: OrderStatusType,
}

//--------------------------------------       NewOrder      ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrder {
    /// The merchant-assigned order number
    pub order_id: OrderId,
    /// The total price of the order, in minor currency units
    pub total_price: Money,
    /// The ISO currency code of the order
    pub currency: String,
    /// An optional free-text note attached to the order
    pub memo: Option<String>,
    /// The time the order was created in the shop
    pub created_at: DateTime<Utc>,
}

impl NewOrder {
    pub fn new(order_id: OrderId, total_price: Money) -> Self {
        Self {
            order_id,
            total_price,
            currency: DEFAULT_CURRENCY_CODE.to_string(),
            memo: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_currency(mut self, currency: &str) -> Self {
        self.currency = currency.to_string();
        self
    }
}

impl Display for NewOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Order {} for {} {}", self.order_id, self.total_price, self.currency)
    }
}

//--------------------------------------     AuditStage      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum AuditStage {
    SessionStart,
    Enter,
    Exit,
    Decision,
    Error,
    SessionEnd,
}

impl Display for AuditStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditStage::SessionStart => write!(f, "SessionStart"),
            AuditStage::Enter => write!(f, "Enter"),
            AuditStage::Exit => write!(f, "Exit"),
            AuditStage::Decision => write!(f, "Decision"),
            AuditStage::Error => write!(f, "Error"),
            AuditStage::SessionEnd => write!(f, "SessionEnd"),
        }
    }
}

//--------------------------------------     AuditRecord     ---------------------------------------------------------
/// One immutable entry in the audit trail. Records are only ever appended, keyed by the session id of the callback
/// request that produced them, and ordered by `seq`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub session_id: String,
    pub seq: i64,
    pub ts: DateTime<Utc>,
    pub stage: AuditStage,
    pub depth: i64,
    pub message: String,
    /// Optional structured context, stored as serialized JSON
    pub payload: Option<String>,
}

//--------------------------------------   NewAuditRecord    ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewAuditRecord {
    pub session_id: String,
    pub seq: i64,
    pub stage: AuditStage,
    pub depth: i64,
    pub message: String,
    pub payload: Option<serde_json::Value>,
}

//------------------------------------ AuditSessionSummary ----------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AuditSessionSummary {
    pub session_id: String,
    pub label: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub final_status: Option<String>,
    pub error: Option<String>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn order_status_round_trip() {
        let statuses = [
            OrderStatusType::New,
            OrderStatusType::Processing,
            OrderStatusType::OnHold,
            OrderStatusType::Completed,
            OrderStatusType::Failed,
            OrderStatusType::Cancelled,
        ];
        for status in statuses {
            let s = status.to_string();
            assert_eq!(s.parse::<OrderStatusType>().unwrap(), status);
        }
    }

    #[test]
    fn terminal_statuses() {
        assert!(!OrderStatusType::New.is_terminal());
        assert!(!OrderStatusType::Processing.is_terminal());
        assert!(!OrderStatusType::OnHold.is_terminal());
        assert!(OrderStatusType::Completed.is_terminal());
        assert!(OrderStatusType::Failed.is_terminal());
        assert!(OrderStatusType::Cancelled.is_terminal());
    }
}
