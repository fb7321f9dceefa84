//! Security subsystem: the building blocks of the admission pipeline.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → headers.rs (resolve the client address)
//!     → reputation.rs (ban check; violations escalate to bans)
//!     → classifier.rs (allowed / denylisted / unrecognized)
//!     → surface.rs (method, content type, origin, upload checks)
//!     → rate_limit.rs (per-category fixed windows)
//!     → sanitize.rs (strip angle brackets from query and body)
//!     → Admit
//!
//! Background:
//!     sweep.rs → reputation + rate_limit (reclaim stale entries)
//! ```
//!
//! # Design Decisions
//! - Fail closed: anything that cannot be evaluated is terminated
//! - Per-client state lives only in sharded maps, never behind a global lock
//! - No trust in client input beyond the configured proxy headers

pub mod classifier;
pub mod headers;
pub mod rate_limit;
pub mod reputation;
pub mod sanitize;
pub mod surface;
pub mod sweep;

pub use classifier::{Classification, DenyReason, PathClassifier, Surface};
pub use headers::{ClientAddress, ClientAddressResolver};
pub use rate_limit::{RateCategory, RateLimiter, WindowPolicy};
pub use reputation::{BanEntry, ReputationStore, ViolationOutcome};
pub use sanitize::{SanitizeError, Sanitizer};
pub use surface::{SurfaceGuard, SurfaceViolation};
pub use sweep::Sweeper;
