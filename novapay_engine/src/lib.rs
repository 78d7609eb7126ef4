//! NovaPay Callback Engine
//!
//! The callback engine is the core of the NovaPay payment gateway: it takes the raw, untrusted bytes of an
//! inbound platform callback and turns them into exactly one local order state transition, or a well-audited
//! refusal. It is HTTP-framework agnostic; the server crate owns the transport.
//!
//! The library is divided into three main sections:
//! 1. The verification pipeline ([`cbe_api`]). [`CallbackProcessor`] drives each request through envelope
//!    parsing, signature verification, payload decoding, order resolution and the order state machine, writing
//!    an audit record at every stage boundary. It always resolves to an acknowledgment decision; raw errors
//!    never escape it.
//! 2. Storage traits and backends ([`traits`], SQLite behind the `sqlite` feature). You should never need to
//!    access the database directly; the exception is the data types in [`db_types`], which are public.
//! 3. The platform signing primitive ([`helpers`]): RSA PKCS#1 v1.5 over MD5, with role-typed key wrappers that
//!    make cross-use of the merchant and platform keys a type error.

pub mod audit;
pub mod cbe_api;
pub mod db_types;
pub mod helpers;
pub mod novapay_types;
pub mod traits;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;

pub use audit::{AuditRecorder, AuditSession};
pub use cbe_api::{
    audit_api::AuditApi,
    callback_flow_api::{
        AckDecision,
        CallbackOutcome,
        CallbackProcessor,
        CallbackStage,
        ProcessingPolicy,
        VerificationConfig,
    },
    errors::CallbackError,
};
