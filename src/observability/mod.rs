//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Admission pipeline produces:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (decision counters, tracked-client gauges)
//!     → access_log.rs (JSON-lines audit trail for the admin viewer)
//! ```

pub mod access_log;
pub mod logging;
pub mod metrics;

pub use access_log::{AccessRecord, AccessSink, FileAccessLog, LogFilter, MemoryAccessLog, NoopAccessLog, Outcome};
