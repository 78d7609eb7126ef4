use actix_web::{http::StatusCode, test, web, App};
use chrono::Utc;
use novapay_engine::{
    db_types::{Order, OrderId, OrderStatusType},
    helpers::{generate_keypair, KeyPairPem, MerchantSecretKey, PlatformPublicKey},
    traits::TransitionOutcome,
    AuditRecorder,
    CallbackProcessor,
    ProcessingPolicy,
    VerificationConfig,
};
use npg_common::Money;
use once_cell::sync::Lazy;
use serde_json::json;

use crate::{
    endpoint_tests::mocks::{permissive_audit_backend, MockBackend},
    routes::{health, novapay_callback},
};

const MERCHANT_NO: &str = "M-10001";

static PLATFORM_KEYS: Lazy<KeyPairPem> = Lazy::new(|| generate_keypair().expect("Failed to generate keypair"));

fn pending_order() -> Order {
    Order {
        id: 1,
        order_id: OrderId("wc-1042".into()),
        total_price: Money::from(5000),
        currency: "RUB".to_string(),
        paid_amount: None,
        fee: None,
        last_txid: None,
        memo: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
        status: OrderStatusType::New,
    }
}

fn result_json() -> String {
    json!({
        "code": "0000",
        "message": "ok",
        "data": {
            "platformOrderNo": "NP-777",
            "merchantOrderNo": "wc-1042",
            "orderStatus": "SUCCESS",
            "orderAmount": 5000,
            "paidAmount": 5000,
            "fee": 75,
            "currency": "RUB"
        }
    })
    .to_string()
}

fn signed_body(result: &str) -> Vec<u8> {
    let signer = MerchantSecretKey::from_pem(PLATFORM_KEYS.private_pem.reveal()).expect("Failed to load signing key");
    let sign = signer.sign(result.as_bytes()).expect("Failed to sign result");
    json!({ "merchantNo": MERCHANT_NO, "result": result, "sign": sign }).to_string().into_bytes()
}

fn processor(db: MockBackend) -> CallbackProcessor<MockBackend> {
    let audit = AuditRecorder::new(permissive_audit_backend(), true);
    let verification = VerificationConfig {
        merchant_no: MERCHANT_NO.to_string(),
        platform_public_key: Some(
            PlatformPublicKey::from_pem(&PLATFORM_KEYS.public_pem).expect("Failed to load platform public key"),
        ),
        allow_unverified: false,
    };
    CallbackProcessor::new(db, audit, verification, ProcessingPolicy::default())
}

async fn post_callback(api: CallbackProcessor<MockBackend>, body: Vec<u8>) -> (StatusCode, String) {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(api))
            .route("/novapay/callback", web::post().to(novapay_callback::<MockBackend>)),
    )
    .await;
    let req = test::TestRequest::post().uri("/novapay/callback").set_payload(body).to_request();
    let res = test::call_service(&app, req).await;
    let status = res.status();
    let body = test::read_body(res).await;
    (status, String::from_utf8_lossy(&body).into_owned())
}

#[actix_web::test]
async fn valid_success_callback_acks_success() {
    let _ = env_logger::try_init().ok();
    let mut db = MockBackend::new();
    db.expect_fetch_order_by_order_id().returning(|_| Ok(Some(pending_order())));
    db.expect_apply_transition().returning(|t| {
        let mut order = pending_order();
        order.status = t.target_status;
        order.paid_amount = t.paid_amount;
        order.fee = t.fee;
        order.last_txid = t.txid;
        Ok(TransitionOutcome::Applied(order))
    });
    let (status, body) = post_callback(processor(db), signed_body(&result_json())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "SUCCESS");
}

#[actix_web::test]
async fn non_json_body_acks_fail_and_never_touches_the_order_store() {
    let _ = env_logger::try_init().ok();
    // No expectations on the db mock: any order store call would panic the test
    let db = MockBackend::new();
    let (status, body) = post_callback(processor(db), b"merchantNo=M-10001&sign=abc".to_vec()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "FAIL");
}

#[actix_web::test]
async fn missing_sign_field_acks_fail() {
    let _ = env_logger::try_init().ok();
    let db = MockBackend::new();
    let body = json!({ "merchantNo": MERCHANT_NO, "result": result_json() }).to_string().into_bytes();
    let (status, body) = post_callback(processor(db), body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "FAIL");
}

#[actix_web::test]
async fn invalid_base64_signature_acks_fail() {
    let _ = env_logger::try_init().ok();
    let db = MockBackend::new();
    let body =
        json!({ "merchantNo": MERCHANT_NO, "result": result_json(), "sign": "@@not-base64@@" }).to_string().into_bytes();
    let (status, body) = post_callback(processor(db), body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "FAIL");
}

#[actix_web::test]
async fn tampered_result_acks_fail_and_never_touches_the_order_store() {
    let _ = env_logger::try_init().ok();
    let db = MockBackend::new();
    let body = String::from_utf8(signed_body(&result_json()))
        .unwrap()
        .replace("\\\"paidAmount\\\":5000", "\\\"paidAmount\\\":9000")
        .into_bytes();
    let (status, body) = post_callback(processor(db), body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "FAIL");
}

#[actix_web::test]
async fn unknown_order_acks_fail_under_the_default_policy() {
    let _ = env_logger::try_init().ok();
    let mut db = MockBackend::new();
    db.expect_fetch_order_by_order_id().returning(|_| Ok(None));
    let (status, body) = post_callback(processor(db), signed_body(&result_json())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "FAIL");
}

#[actix_web::test]
async fn health_check_is_alive() {
    let app = test::init_service(App::new().service(health)).await;
    let req = test::TestRequest::get().uri("/health").to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);
}
