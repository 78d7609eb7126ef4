//! Request handler definitions
//!
//! Define each route and its handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! The callback handler is generic over the storage backend so that the endpoint tests can run it against
//! mocks; actix attribute macros cannot express that, so it is registered manually with a turbofish in
//! [`crate::server`].

use actix_web::{get, web, HttpResponse, Responder};
use log::*;
use novapay_engine::{
    traits::{AuditStore, GatewayDatabase},
    AckDecision,
    CallbackProcessor,
};

#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

/// The NovaPay callback webhook.
///
/// The raw body bytes go straight into the callback engine; no deserialization happens at the HTTP layer, since
/// the signature is computed over the exact bytes of the `result` field and the engine owns the parse order.
///
/// The response is always 200 with a plain-text body: the platform's retry logic keys on the literal body, not
/// the status code. `SUCCESS` stops redelivery; anything else schedules a retry.
pub async fn novapay_callback<B>(body: web::Bytes, api: web::Data<CallbackProcessor<B>>) -> HttpResponse
where B: GatewayDatabase + AuditStore + 'static {
    trace!("📨️ Received NovaPay callback ({} bytes)", body.len());
    let outcome = api.process(body.as_ref()).await;
    match outcome.ack {
        AckDecision::Success => debug!("📨️ Callback acknowledged: {} [session {}]", outcome.summary, outcome.session_id),
        AckDecision::Failure => {
            warn!("📨️ Callback refused: {} [session {}]", outcome.summary, outcome.session_id)
        },
    }
    HttpResponse::Ok().content_type("text/plain").body(outcome.ack.body())
}
