//! Wire types for the NovaPay callback envelope.
//!
//! NovaPay delivers payment outcomes as an HTTP POST with a three-field JSON envelope: the merchant number, an
//! opaque `result` string (itself a serialized JSON document) and a base64 `sign` over the raw `result` bytes.
//!
//! Parsing is deliberately two-phase. [`CallbackEnvelope::from_bytes`] decodes the outer envelope only; the
//! `result` string stays opaque until the signature has been verified, after which
//! [`PaymentResult::from_result_str`] decodes the business payload. Decoding unverified business data is how
//! forged callbacks get a foothold, so the second phase must never run before verification.

use std::fmt::Display;

use npg_common::Money;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Malformed callback envelope: {0}")]
pub struct EnvelopeParseError(pub String);

#[derive(Debug, Clone, Error)]
#[error("Malformed payment result payload: {0}")]
pub struct PayloadParseError(pub String);

//-------------------------------------- CallbackEnvelope -----------------------------------------------------------
/// The outer, untrusted transport envelope. Meaningless until `sign` verifies against the raw `result` bytes with
/// the platform public key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackEnvelope {
    #[serde(rename = "merchantNo", alias = "merchant_id")]
    pub merchant_no: String,
    /// The signed content: a serialized JSON document describing the payment outcome
    pub result: String,
    /// Base64-encoded signature over `result`
    pub sign: String,
}

impl CallbackEnvelope {
    pub fn from_bytes(body: &[u8]) -> Result<Self, EnvelopeParseError> {
        serde_json::from_slice(body).map_err(|e| EnvelopeParseError(e.to_string()))
    }
}

//--------------------------------------  CallbackStatus  -----------------------------------------------------------
/// The payment outcome as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallbackStatus {
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "FAIL")]
    Fail,
    #[serde(rename = "CANCEL")]
    Cancel,
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "WAIT_3DS")]
    Wait3ds,
}

impl Display for CallbackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallbackStatus::Success => write!(f, "SUCCESS"),
            CallbackStatus::Fail => write!(f, "FAIL"),
            CallbackStatus::Cancel => write!(f, "CANCEL"),
            CallbackStatus::Pending => write!(f, "PENDING"),
            CallbackStatus::Wait3ds => write!(f, "WAIT_3DS"),
        }
    }
}

//--------------------------------------  PaymentResult  ------------------------------------------------------------
/// The decoded `result` document. Only ever constructed after the envelope signature has verified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentResult {
    pub code: String,
    pub message: String,
    pub data: PaymentData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentData {
    /// The platform's own transaction identifier. Used as the idempotence marker on the local order.
    pub platform_order_no: String,
    /// The merchant-assigned order number; correlates the callback to a local order.
    pub merchant_order_no: String,
    pub order_status: CallbackStatus,
    /// The order total as the platform knows it, in minor currency units. A float here is a wire defect and fails
    /// the parse.
    pub order_amount: Money,
    /// The amount actually paid, in minor currency units
    pub paid_amount: Money,
    #[serde(default)]
    pub fee: Money,
    pub currency: String,
    #[serde(default)]
    pub pay_method: Option<String>,
    #[serde(default)]
    pub order_time: Option<String>,
    #[serde(default)]
    pub finish_time: Option<String>,
    /// 3-DS challenge URL, present when `order_status` is `WAIT_3DS`
    #[serde(default)]
    pub redirect_url: Option<String>,
}

impl PaymentResult {
    pub fn from_result_str(result: &str) -> Result<Self, PayloadParseError> {
        serde_json::from_str(result).map_err(|e| PayloadParseError(e.to_string()))
    }
}
