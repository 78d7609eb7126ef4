use npg_common::Money;

use crate::db_types::{Order, OrderId, OrderStatusType};

//------------------------------------   OrderTransition   ----------------------------------------------------------
/// A fully-specified order state change, produced by the order state machine and applied atomically by the
/// backend.
///
/// `txid` is the platform transaction id driving the change. When present, it acts as the idempotence marker: the
/// backend must refuse to re-apply a transition whose `txid` matches the order's stored `last_txid`, and must
/// record it on the order when the transition applies. Non-terminal transitions (a 3-DS hold, say) leave `txid`
/// unset so that the final callback for the same platform transaction can still be applied.
#[derive(Debug, Clone)]
pub struct OrderTransition {
    pub order_id: OrderId,
    pub target_status: OrderStatusType,
    pub txid: Option<String>,
    pub paid_amount: Option<Money>,
    pub fee: Option<Money>,
    pub memo: Option<String>,
}

impl OrderTransition {
    pub fn new(order_id: OrderId, target_status: OrderStatusType) -> Self {
        Self { order_id, target_status, txid: None, paid_amount: None, fee: None, memo: None }
    }

    pub fn with_txid(mut self, txid: &str) -> Self {
        self.txid = Some(txid.to_string());
        self
    }

    pub fn with_amounts(mut self, paid_amount: Money, fee: Money) -> Self {
        self.paid_amount = Some(paid_amount);
        self.fee = Some(fee);
        self
    }

    pub fn with_memo(mut self, memo: String) -> Self {
        self.memo = Some(memo);
        self
    }
}

//------------------------------------  TransitionOutcome  ----------------------------------------------------------
/// What actually happened when a transition was applied. All three outcomes carry the order as it stands after
/// the call.
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    /// The transition was applied and the order updated.
    Applied(Order),
    /// The same platform transaction id was already applied to this order; nothing changed. Replays land here.
    AlreadyApplied(Order),
    /// The order is already in a terminal state that contradicts the requested change. Nothing changed.
    Superseded(Order),
}

impl TransitionOutcome {
    pub fn order(&self) -> &Order {
        match self {
            TransitionOutcome::Applied(o) => o,
            TransitionOutcome::AlreadyApplied(o) => o,
            TransitionOutcome::Superseded(o) => o,
        }
    }

    pub fn was_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied(_))
    }
}
