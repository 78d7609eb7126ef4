use std::sync::{
    atomic::{AtomicI64, AtomicU64, Ordering},
    Arc,
};

use log::*;
use rand::RngCore;
use serde_json::Value;

use crate::{
    db_types::{AuditStage, NewAuditRecord},
    traits::AuditStore,
};

//--------------------------------------   AuditRecorder     --------------------------------------------------------
/// Factory for per-request audit sessions. One recorder instance is constructed at startup and injected into the
/// pipeline; there is no ambient global state.
#[derive(Clone)]
pub struct AuditRecorder<B: AuditStore> {
    store: B,
    verbose: bool,
    write_failures: Arc<AtomicU64>,
}

impl<B: AuditStore> AuditRecorder<B> {
    /// When `verbose` is false, `Enter`/`Exit` records are suppressed and only decisions, errors and session
    /// boundaries are written.
    pub fn new(store: B, verbose: bool) -> Self {
        Self { store, verbose, write_failures: Arc::new(AtomicU64::new(0)) }
    }

    pub async fn start_session(&self, label: &str, context: Option<Value>) -> AuditSession<B> {
        let id = new_session_id();
        if let Err(e) = self.store.create_session(&id, label, context.clone()).await {
            warn!("🧾️ Could not create audit session {id}: {e}");
            self.write_failures.fetch_add(1, Ordering::Relaxed);
        }
        let session = AuditSession {
            id,
            store: self.store.clone(),
            verbose: self.verbose,
            seq: Arc::new(AtomicI64::new(0)),
            depth: Arc::new(AtomicI64::new(0)),
            failures: Arc::clone(&self.write_failures),
        };
        session.write(AuditStage::SessionStart, 0, label.to_string(), context).await;
        session
    }

    /// The number of audit writes that have failed since this recorder was constructed. A climbing value means
    /// the audit store needs operator attention, even though callbacks are still being processed.
    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }
}

//--------------------------------------    AuditSession     --------------------------------------------------------
/// The audit handle for one callback request. All records written through a session share its correlation id and
/// draw from its sequence counter.
#[derive(Clone)]
pub struct AuditSession<B: AuditStore> {
    id: String,
    store: B,
    verbose: bool,
    seq: Arc<AtomicI64>,
    depth: Arc<AtomicI64>,
    failures: Arc<AtomicU64>,
}

impl<B: AuditStore> AuditSession<B> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn enter(&self, component: &str, operation: &str, params: Option<Value>) {
        let depth = self.depth.fetch_add(1, Ordering::SeqCst) + 1;
        if self.verbose {
            self.write(AuditStage::Enter, depth, format!("{component}.{operation}"), params).await;
        }
    }

    pub async fn exit(&self, component: &str, operation: &str, result: Option<Value>) {
        let depth = self.depth.load(Ordering::SeqCst);
        if self.verbose {
            self.write(AuditStage::Exit, depth, format!("{component}.{operation}"), result).await;
        }
        self.depth.fetch_sub(1, Ordering::SeqCst);
    }

    pub async fn decision(&self, condition: &str, outcome: &str, context: Option<Value>) {
        let depth = self.depth.load(Ordering::SeqCst);
        self.write(AuditStage::Decision, depth, format!("{condition} => {outcome}"), context).await;
    }

    pub async fn error(&self, message: &str, context: Option<Value>) {
        let depth = self.depth.load(Ordering::SeqCst);
        self.write(AuditStage::Error, depth, message.to_string(), context).await;
    }

    pub async fn end(&self, final_status: &str, error: Option<String>) {
        self.write(AuditStage::SessionEnd, 0, final_status.to_string(), error.clone().map(Value::String)).await;
        if let Err(e) = self.store.finalize_session(&self.id, final_status, error).await {
            warn!("🧾️ Could not finalize audit session {}: {e}", self.id);
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    async fn write(&self, stage: AuditStage, depth: i64, message: String, payload: Option<Value>) {
        let record = NewAuditRecord {
            session_id: self.id.clone(),
            seq: self.seq.fetch_add(1, Ordering::SeqCst),
            stage,
            depth,
            message,
            payload,
        };
        if let Err(e) = self.store.append_record(record).await {
            // Log-and-continue: the pipeline must not die because the audit trail did.
            warn!("🧾️ Audit write failed for session {}: {e}", self.id);
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// 16 random bytes, hex-encoded. Unique enough to correlate concurrent callback requests.
fn new_session_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn session_ids_are_32_hex_chars() {
        let id = new_session_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, new_session_id());
    }
}
