use thiserror::Error;

use crate::{
    cbe_api::callback_flow_api::CallbackStage,
    db_types::OrderId,
    novapay_types::{EnvelopeParseError, PayloadParseError},
    traits::GatewayStorageError,
};

/// Everything that can terminate a callback before it is acknowledged. Every variant is caught at the pipeline
/// boundary, written to the audit trail with context and translated into an acknowledgment; none of them
/// propagate to the platform as a raw error.
#[derive(Debug, Clone, Error)]
pub enum CallbackError {
    #[error("Malformed callback envelope: {0}")]
    MalformedEnvelope(String),
    #[error("Malformed payment result payload: {0}")]
    MalformedPayload(String),
    #[error("Callback signature failed verification against the platform public key")]
    SignatureInvalid,
    #[error("Callback addressed to merchant {got}, but this gateway serves merchant {expected}")]
    MerchantMismatch { expected: String, got: String },
    #[error("No platform public key is configured and unverified callbacks are not accepted")]
    VerificationUnavailable,
    #[error("No local order matches merchant order number {0}")]
    OrderNotFound(OrderId),
    #[error("Reconciliation failed for order {order_id}: {detail}")]
    ReconciliationMismatch { order_id: OrderId, detail: String },
    #[error("Could not persist the order update: {0}")]
    PersistenceFailure(String),
}

impl CallbackError {
    /// Short machine-readable reason code, as recorded in the audit trail.
    pub fn code(&self) -> &'static str {
        match self {
            CallbackError::MalformedEnvelope(_) => "MALFORMED_ENVELOPE",
            CallbackError::MalformedPayload(_) => "MALFORMED_PAYLOAD",
            CallbackError::SignatureInvalid => "SIGNATURE_INVALID",
            CallbackError::MerchantMismatch { .. } => "MERCHANT_MISMATCH",
            CallbackError::VerificationUnavailable => "VERIFICATION_UNAVAILABLE",
            CallbackError::OrderNotFound(_) => "ORDER_NOT_FOUND",
            CallbackError::ReconciliationMismatch { .. } => "RECONCILIATION_MISMATCH",
            CallbackError::PersistenceFailure(_) => "PERSISTENCE_FAILURE",
        }
    }

    /// The pipeline stage that was active when this error absorbed the request.
    pub fn failed_stage(&self) -> CallbackStage {
        match self {
            CallbackError::MalformedEnvelope(_) => CallbackStage::Received,
            CallbackError::MerchantMismatch { .. } => CallbackStage::EnvelopeParsed,
            CallbackError::SignatureInvalid => CallbackStage::EnvelopeParsed,
            CallbackError::VerificationUnavailable => CallbackStage::EnvelopeParsed,
            CallbackError::MalformedPayload(_) => CallbackStage::SignatureVerified,
            CallbackError::OrderNotFound(_) => CallbackStage::PayloadParsed,
            CallbackError::ReconciliationMismatch { .. } => CallbackStage::OrderResolved,
            CallbackError::PersistenceFailure(_) => CallbackStage::OrderResolved,
        }
    }
}

impl From<EnvelopeParseError> for CallbackError {
    fn from(e: EnvelopeParseError) -> Self {
        CallbackError::MalformedEnvelope(e.0)
    }
}

impl From<PayloadParseError> for CallbackError {
    fn from(e: PayloadParseError) -> Self {
        CallbackError::MalformedPayload(e.0)
    }
}

impl From<GatewayStorageError> for CallbackError {
    fn from(e: GatewayStorageError) -> Self {
        match e {
            GatewayStorageError::DatabaseError(msg) => CallbackError::PersistenceFailure(msg),
            GatewayStorageError::OrderNotFound(id) => CallbackError::OrderNotFound(id),
        }
    }
}
