use std::fmt::{Debug, Display};

use log::*;
use serde_json::json;

use crate::{
    audit::{AuditRecorder, AuditSession},
    cbe_api::errors::CallbackError,
    db_types::{Order, OrderId, OrderStatusType},
    helpers::PlatformPublicKey,
    novapay_types::{CallbackEnvelope, CallbackStatus, PaymentResult},
    traits::{AuditStore, GatewayDatabase, OrderTransition, TransitionOutcome},
};

pub const CALLBACK_SESSION_LABEL: &str = "novapay_callback";

//--------------------------------------   CallbackStage     --------------------------------------------------------
/// The request state machine for one inbound callback. `Error` is the absorbing state, reachable from every
/// other node. Stage transitions are written to the audit trail as decision records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackStage {
    Received,
    EnvelopeParsed,
    SignatureVerified,
    PayloadParsed,
    OrderResolved,
    StateApplied,
    Acked,
    Error,
}

impl Display for CallbackStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallbackStage::Received => write!(f, "RECEIVED"),
            CallbackStage::EnvelopeParsed => write!(f, "ENVELOPE_PARSED"),
            CallbackStage::SignatureVerified => write!(f, "SIGNATURE_VERIFIED"),
            CallbackStage::PayloadParsed => write!(f, "PAYLOAD_PARSED"),
            CallbackStage::OrderResolved => write!(f, "ORDER_RESOLVED"),
            CallbackStage::StateApplied => write!(f, "STATE_APPLIED"),
            CallbackStage::Acked => write!(f, "ACKED"),
            CallbackStage::Error => write!(f, "ERROR"),
        }
    }
}

//--------------------------------------    AckDecision      --------------------------------------------------------
/// What the platform is told. The platform's retry loop keys on the literal response body: `SUCCESS` stops
/// retries, anything else schedules another delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckDecision {
    Success,
    Failure,
}

impl AckDecision {
    pub fn body(&self) -> &'static str {
        match self {
            AckDecision::Success => "SUCCESS",
            AckDecision::Failure => "FAIL",
        }
    }
}

//--------------------------------------  CallbackOutcome    --------------------------------------------------------
/// The result of driving one callback through the pipeline. Always produced; the pipeline never errors out of
/// this type.
#[derive(Debug, Clone)]
pub struct CallbackOutcome {
    pub ack: AckDecision,
    /// Correlation id of the audit session recorded for this request
    pub session_id: String,
    /// The final stage: `Acked` or `Error`
    pub stage: CallbackStage,
    pub error: Option<CallbackError>,
    /// The order as it stands after processing, when one was resolved and survived to state application
    pub order: Option<Order>,
    /// Human-readable disposition for logs
    pub summary: String,
}

//------------------------------------  VerificationConfig  ---------------------------------------------------------
/// Who we are, and how inbound signatures are checked.
///
/// `platform_public_key = None` with `allow_unverified = false` (the default posture) rejects every callback:
/// a gateway without a verification key is not silently trusted. Setting `allow_unverified = true` is the
/// documented degraded mode; each skipped verification is recorded loudly in the audit trail so the distinction
/// between "verified" and "skipped" survives into forensics.
#[derive(Debug, Clone)]
pub struct VerificationConfig {
    pub merchant_no: String,
    pub platform_public_key: Option<PlatformPublicKey>,
    pub allow_unverified: bool,
}

//-------------------------------------  ProcessingPolicy  ----------------------------------------------------------
#[derive(Debug, Clone, Copy)]
pub struct ProcessingPolicy {
    /// When true, a callback for an unknown order is acknowledged with success so the platform stops retrying.
    /// When false (default), it is a failure ack and the platform keeps retrying while operators investigate.
    pub ack_unknown_orders: bool,
    /// Maximum tolerated difference, in minor currency units, between the callback's paid amount and the stored
    /// order total. Zero means exact match.
    pub reconciliation_tolerance: i64,
}

impl Default for ProcessingPolicy {
    fn default() -> Self {
        Self { ack_unknown_orders: false, reconciliation_tolerance: 0 }
    }
}

//------------------------------------  CallbackProcessor  ----------------------------------------------------------
/// `CallbackProcessor` is the primary API for handling NovaPay payment callbacks. It drives each request through
/// the [`CallbackStage`] machine, writing an audit record at every stage boundary, and always resolves to a
/// [`CallbackOutcome`] carrying the acknowledgment for the platform.
pub struct CallbackProcessor<B: AuditStore> {
    db: B,
    audit: AuditRecorder<B>,
    verification: VerificationConfig,
    policy: ProcessingPolicy,
}

impl<B: AuditStore> Debug for CallbackProcessor<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CallbackProcessor for merchant {}", self.verification.merchant_no)
    }
}

impl<B> CallbackProcessor<B>
where B: GatewayDatabase + AuditStore
{
    pub fn new(db: B, audit: AuditRecorder<B>, verification: VerificationConfig, policy: ProcessingPolicy) -> Self {
        Self { db, audit, verification, policy }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn audit(&self) -> &AuditRecorder<B> {
        &self.audit
    }

    /// Process one raw callback body end to end. This method does not error: every failure mode collapses into
    /// a failure acknowledgment, with the cause preserved in the outcome and in the audit trail.
    pub async fn process(&self, body: &[u8]) -> CallbackOutcome {
        let session = self.audit.start_session(CALLBACK_SESSION_LABEL, Some(json!({ "body_bytes": body.len() }))).await;
        debug!("📨️ Callback received ({} bytes), session {}", body.len(), session.id());
        match self.run(body, &session).await {
            Ok((order, summary)) => {
                session.decision("pipeline_stage", "ACKED", Some(json!({ "ack": "SUCCESS" }))).await;
                session.end("success", None).await;
                info!("📨️ Callback processed: {summary}. [session {}]", session.id());
                CallbackOutcome {
                    ack: AckDecision::Success,
                    session_id: session.id().to_string(),
                    stage: CallbackStage::Acked,
                    error: None,
                    order,
                    summary,
                }
            },
            Err(e) => {
                let ack = self.ack_for_error(&e);
                session
                    .error(&e.to_string(), Some(json!({
                        "reason": e.code(),
                        "failed_stage": e.failed_stage().to_string(),
                    })))
                    .await;
                session.decision("pipeline_stage", "ERROR", Some(json!({ "ack": ack.body() }))).await;
                session.end("failed", Some(e.to_string())).await;
                match &e {
                    CallbackError::SignatureInvalid => {
                        error!("📨️🚨️ Callback REJECTED: invalid signature. [session {}]", session.id());
                    },
                    e => warn!("📨️ Callback failed: {e}. [session {}]", session.id()),
                }
                let summary = format!("{}: {e}", e.code());
                CallbackOutcome {
                    ack,
                    session_id: session.id().to_string(),
                    stage: CallbackStage::Error,
                    error: Some(e),
                    order: None,
                    summary,
                }
            },
        }
    }

    async fn run(
        &self,
        body: &[u8],
        session: &AuditSession<B>,
    ) -> Result<(Option<Order>, String), CallbackError> {
        // ---------------------------------- Envelope ----------------------------------
        session.enter("envelope_parser", "from_bytes", Some(json!({ "bytes": body.len() }))).await;
        let parsed = CallbackEnvelope::from_bytes(body);
        session.exit("envelope_parser", "from_bytes", Some(json!({ "ok": parsed.is_ok() }))).await;
        let envelope = parsed?;
        session
            .decision("pipeline_stage", &CallbackStage::EnvelopeParsed.to_string(), Some(json!({
                "merchant_no": envelope.merchant_no,
            })))
            .await;

        if envelope.merchant_no != self.verification.merchant_no {
            return Err(CallbackError::MerchantMismatch {
                expected: self.verification.merchant_no.clone(),
                got: envelope.merchant_no,
            });
        }

        // ---------------------------------- Signature ----------------------------------
        session.enter("callback_verifier", "verify_signature", None).await;
        let verdict = self.verify_signature(&envelope, session).await;
        session
            .exit("callback_verifier", "verify_signature", Some(json!({ "ok": verdict.is_ok() })))
            .await;
        let verification = verdict?;
        session
            .decision("pipeline_stage", &CallbackStage::SignatureVerified.to_string(), Some(json!({
                "verification": verification,
            })))
            .await;

        // ---------------------------------- Payload ----------------------------------
        // Only now that the signature holds is the business payload decoded.
        session.enter("envelope_parser", "decode_result", None).await;
        let decoded = PaymentResult::from_result_str(&envelope.result);
        session.exit("envelope_parser", "decode_result", Some(json!({ "ok": decoded.is_ok() }))).await;
        let result = decoded?;
        session
            .decision("pipeline_stage", &CallbackStage::PayloadParsed.to_string(), Some(json!({
                "platform_order_no": result.data.platform_order_no,
                "merchant_order_no": result.data.merchant_order_no,
                "order_status": result.data.order_status.to_string(),
            })))
            .await;

        // ---------------------------------- Resolve ----------------------------------
        let order_id = OrderId(result.data.merchant_order_no.clone());
        session.enter("order_resolver", "fetch_order", Some(json!({ "order_id": order_id.as_str() }))).await;
        let found = self.db.fetch_order_by_order_id(&order_id).await;
        session
            .exit("order_resolver", "fetch_order", Some(json!({ "found": matches!(&found, Ok(Some(_))) })))
            .await;
        let order = found
            .map_err(CallbackError::from)?
            .ok_or_else(|| CallbackError::OrderNotFound(order_id.clone()))?;
        session
            .decision("pipeline_stage", &CallbackStage::OrderResolved.to_string(), Some(json!({
                "order_id": order.order_id.as_str(),
                "status": order.status.to_string(),
                "total_price": order.total_price.value(),
            })))
            .await;

        // ---------------------------------- State machine ----------------------------------
        let planned = plan_transition(&order, &result, self.policy.reconciliation_tolerance)?;
        let (order, summary) = match planned {
            PlannedAction::NoTransition { reason } => {
                session.decision("order_state", reason, None).await;
                (Some(order), reason.to_string())
            },
            PlannedAction::Apply(transition) => self.apply(transition, session).await?,
        };
        session.decision("pipeline_stage", &CallbackStage::StateApplied.to_string(), None).await;
        Ok((order, summary))
    }

    async fn verify_signature(
        &self,
        envelope: &CallbackEnvelope,
        session: &AuditSession<B>,
    ) -> Result<&'static str, CallbackError> {
        match &self.verification.platform_public_key {
            Some(key) => {
                if key.verify(envelope.result.as_bytes(), &envelope.sign) {
                    Ok("verified")
                } else {
                    Err(CallbackError::SignatureInvalid)
                }
            },
            None if self.verification.allow_unverified => {
                warn!(
                    "🔏️🚨️ No platform public key is configured. Accepting an UNVERIFIED callback because \
                     allow_unverified is set. The audit trail records this callback as skipped, not verified."
                );
                session
                    .decision(
                        "signature_verification",
                        "skipped: no platform public key configured, explicit override active",
                        None,
                    )
                    .await;
                Ok("skipped")
            },
            None => Err(CallbackError::VerificationUnavailable),
        }
    }

    async fn apply(
        &self,
        transition: OrderTransition,
        session: &AuditSession<B>,
    ) -> Result<(Option<Order>, String), CallbackError> {
        session
            .enter("order_state", "apply_transition", Some(json!({
                "order_id": transition.order_id.as_str(),
                "target_status": transition.target_status.to_string(),
                "txid": transition.txid,
            })))
            .await;
        let applied = self.db.apply_transition(transition).await;
        session.exit("order_state", "apply_transition", Some(json!({ "ok": applied.is_ok() }))).await;
        match applied.map_err(CallbackError::from)? {
            TransitionOutcome::Applied(order) => {
                let summary = format!("order {} transitioned to {}", order.order_id, order.status);
                session
                    .decision("order_state", "transition applied", Some(json!({
                        "order_id": order.order_id.as_str(),
                        "status": order.status.to_string(),
                        "paid_amount": order.paid_amount.map(|m| m.value()),
                        "fee": order.fee.map(|m| m.value()),
                    })))
                    .await;
                Ok((Some(order), summary))
            },
            TransitionOutcome::AlreadyApplied(order) => {
                let summary = format!("replayed callback for order {} ignored", order.order_id);
                session
                    .decision("order_state", "replay detected: transaction already applied, no-op", Some(json!({
                        "order_id": order.order_id.as_str(),
                        "last_txid": order.last_txid,
                    })))
                    .await;
                Ok((Some(order), summary))
            },
            TransitionOutcome::Superseded(order) => {
                // A terminal order received a contradicting callback. The order is left untouched; acking
                // success stops the platform from retrying a delivery that can never apply. The audit trail
                // flags it for manual review.
                let summary =
                    format!("conflicting callback for terminal order {} ignored", order.order_id);
                warn!("📨️ {summary} (current status {})", order.status);
                session
                    .decision("order_state", "conflicting callback ignored: order is in a terminal state", Some(json!({
                        "order_id": order.order_id.as_str(),
                        "status": order.status.to_string(),
                    })))
                    .await;
                Ok((Some(order), summary))
            },
        }
    }

    fn ack_for_error(&self, e: &CallbackError) -> AckDecision {
        match e {
            CallbackError::OrderNotFound(_) if self.policy.ack_unknown_orders => AckDecision::Success,
            _ => AckDecision::Failure,
        }
    }
}

//--------------------------------------  Transition planning  ------------------------------------------------------
#[derive(Debug)]
enum PlannedAction {
    NoTransition { reason: &'static str },
    Apply(OrderTransition),
}

/// Map a verified payment result onto a local order transition. Pure: no I/O, fully unit-testable.
fn plan_transition(order: &Order, result: &PaymentResult, tolerance: i64) -> Result<PlannedAction, CallbackError> {
    let data = &result.data;
    match data.order_status {
        CallbackStatus::Pending => {
            Ok(PlannedAction::NoTransition { reason: "PENDING: no terminal transition, awaiting a later callback" })
        },
        CallbackStatus::Wait3ds => {
            let memo = match &data.redirect_url {
                Some(url) => format!("3DS challenge pending: {url}"),
                None => "3DS challenge pending".to_string(),
            };
            // The idempotence marker is deliberately not consumed here: the final SUCCESS/FAIL callback for the
            // same platform transaction must still be applicable.
            let transition =
                OrderTransition::new(order.order_id.clone(), OrderStatusType::OnHold).with_memo(memo);
            Ok(PlannedAction::Apply(transition))
        },
        CallbackStatus::Success => {
            reconcile(order, result, tolerance)?;
            let transition = OrderTransition::new(order.order_id.clone(), OrderStatusType::Completed)
                .with_txid(&data.platform_order_no)
                .with_amounts(data.paid_amount, data.fee);
            Ok(PlannedAction::Apply(transition))
        },
        CallbackStatus::Fail => {
            let transition = OrderTransition::new(order.order_id.clone(), OrderStatusType::Failed)
                .with_txid(&data.platform_order_no)
                .with_memo(format!("Payment failed. Platform code {}: {}", result.code, result.message));
            Ok(PlannedAction::Apply(transition))
        },
        CallbackStatus::Cancel => {
            let transition = OrderTransition::new(order.order_id.clone(), OrderStatusType::Cancelled)
                .with_txid(&data.platform_order_no)
                .with_memo(format!("Cancelled by platform. Code {}: {}", result.code, result.message));
            Ok(PlannedAction::Apply(transition))
        },
    }
}

/// Amounts are compared in minor units, never floats. Currency mismatches are always hard errors; they are never
/// coerced, whatever the tolerance.
fn reconcile(order: &Order, result: &PaymentResult, tolerance: i64) -> Result<(), CallbackError> {
    let data = &result.data;
    if !order.currency.eq_ignore_ascii_case(&data.currency) {
        return Err(CallbackError::ReconciliationMismatch {
            order_id: order.order_id.clone(),
            detail: format!("currency mismatch: order is {}, callback says {}", order.currency, data.currency),
        });
    }
    if data.order_amount != order.total_price {
        return Err(CallbackError::ReconciliationMismatch {
            order_id: order.order_id.clone(),
            detail: format!(
                "platform order amount {} does not match stored order total {}",
                data.order_amount, order.total_price
            ),
        });
    }
    if order.total_price.difference(data.paid_amount) > tolerance {
        return Err(CallbackError::ReconciliationMismatch {
            order_id: order.order_id.clone(),
            detail: format!(
                "paid amount {} differs from order total {} by more than the tolerance of {tolerance} minor units",
                data.paid_amount, order.total_price
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use chrono::Utc;
    use npg_common::Money;

    use super::*;
    use crate::novapay_types::PaymentData;

    fn order(total: i64, currency: &str, status: OrderStatusType) -> Order {
        Order {
            id: 1,
            order_id: OrderId("wc-1042".into()),
            total_price: Money::from(total),
            currency: currency.to_string(),
            paid_amount: None,
            fee: None,
            last_txid: None,
            memo: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            status,
        }
    }

    fn payment_result(status: CallbackStatus, order_amount: i64, paid_amount: i64, currency: &str) -> PaymentResult {
        PaymentResult {
            code: "0000".to_string(),
            message: "ok".to_string(),
            data: PaymentData {
                platform_order_no: "NP-777".to_string(),
                merchant_order_no: "wc-1042".to_string(),
                order_status: status,
                order_amount: Money::from(order_amount),
                paid_amount: Money::from(paid_amount),
                fee: Money::from(75),
                currency: currency.to_string(),
                pay_method: Some("card".to_string()),
                order_time: None,
                finish_time: None,
                redirect_url: None,
            },
        }
    }

    #[test]
    fn success_plans_completion_with_marker_and_amounts() {
        let order = order(5000, "RUB", OrderStatusType::New);
        let result = payment_result(CallbackStatus::Success, 5000, 5000, "RUB");
        match plan_transition(&order, &result, 0).unwrap() {
            PlannedAction::Apply(t) => {
                assert_eq!(t.target_status, OrderStatusType::Completed);
                assert_eq!(t.txid.as_deref(), Some("NP-777"));
                assert_eq!(t.paid_amount, Some(Money::from(5000)));
                assert_eq!(t.fee, Some(Money::from(75)));
            },
            PlannedAction::NoTransition { .. } => panic!("expected a transition"),
        }
    }

    #[test]
    fn pending_plans_no_transition() {
        let order = order(5000, "RUB", OrderStatusType::New);
        let result = payment_result(CallbackStatus::Pending, 5000, 0, "RUB");
        assert!(matches!(plan_transition(&order, &result, 0).unwrap(), PlannedAction::NoTransition { .. }));
    }

    #[test]
    fn wait_3ds_plans_hold_without_consuming_the_marker() {
        let order = order(5000, "RUB", OrderStatusType::New);
        let mut result = payment_result(CallbackStatus::Wait3ds, 5000, 0, "RUB");
        result.data.redirect_url = Some("https://acs.example/challenge".to_string());
        match plan_transition(&order, &result, 0).unwrap() {
            PlannedAction::Apply(t) => {
                assert_eq!(t.target_status, OrderStatusType::OnHold);
                assert_eq!(t.txid, None);
                assert!(t.memo.unwrap().contains("https://acs.example/challenge"));
            },
            PlannedAction::NoTransition { .. } => panic!("expected a transition"),
        }
    }

    #[test]
    fn currency_mismatch_is_a_hard_error_even_with_tolerance() {
        let order = order(5000, "RUB", OrderStatusType::New);
        let result = payment_result(CallbackStatus::Success, 5000, 5000, "USD");
        let err = plan_transition(&order, &result, 10_000).unwrap_err();
        assert_eq!(err.code(), "RECONCILIATION_MISMATCH");
        assert!(err.to_string().contains("currency mismatch"));
    }

    #[test]
    fn amount_mismatch_respects_tolerance() {
        let order = order(5000, "RUB", OrderStatusType::New);
        // Exact policy: a 3-kopeck shortfall is rejected
        let result = payment_result(CallbackStatus::Success, 5000, 4997, "RUB");
        assert!(plan_transition(&order, &result, 0).is_err());
        // Small-tolerance policy: the same shortfall is accepted
        assert!(matches!(plan_transition(&order, &result, 5).unwrap(), PlannedAction::Apply(_)));
    }

    #[test]
    fn platform_order_amount_must_match_stored_total() {
        let order = order(5000, "RUB", OrderStatusType::New);
        let result = payment_result(CallbackStatus::Success, 9999, 5000, "RUB");
        let err = plan_transition(&order, &result, 0).unwrap_err();
        assert!(err.to_string().contains("does not match stored order total"));
    }

    #[test]
    fn fail_records_platform_code_in_memo() {
        let order = order(5000, "RUB", OrderStatusType::New);
        let mut result = payment_result(CallbackStatus::Fail, 5000, 0, "RUB");
        result.code = "3002".to_string();
        result.message = "insufficient funds".to_string();
        match plan_transition(&order, &result, 0).unwrap() {
            PlannedAction::Apply(t) => {
                assert_eq!(t.target_status, OrderStatusType::Failed);
                let memo = t.memo.unwrap();
                assert!(memo.contains("3002"));
                assert!(memo.contains("insufficient funds"));
            },
            PlannedAction::NoTransition { .. } => panic!("expected a transition"),
        }
    }
}
