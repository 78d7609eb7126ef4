//! Structured audit recording for the callback pipeline.
//!
//! Every inbound callback gets its own audit session: a correlation id, a monotonically increasing sequence
//! number and a call-depth counter. Pipeline stages write `Enter`/`Exit` pairs, decision points write `Decision`
//! records and failures write `Error` records, so an operator can replay exactly what a callback did and why.
//!
//! Audit writes are best-effort with respect to the pipeline: a failed write is logged and counted, but never
//! aborts callback processing. A climbing [`AuditRecorder::write_failures`] counter is the health signal that the
//! audit store itself is in trouble.

mod recorder;

pub use recorder::{AuditRecorder, AuditSession};
