//! Admission pipeline.
//!
//! # Data Flow
//! ```text
//! Request<Body> (with ConnectInfo)
//!     → layer.rs (tower Service wrapper)
//!     → gatekeeper.rs (ordered stages over the security stores)
//!     → decision.rs (Admit | Reject(status) | Terminate(reason))
//!     → downstream service, bare status, or dropped connection
//! ```

pub mod decision;
pub mod gatekeeper;
pub mod layer;

pub use decision::{Decision, TerminateReason, Terminated};
pub use gatekeeper::{Gatekeeper, GatekeeperError};
pub use layer::{GatekeeperLayer, GatekeeperService};
