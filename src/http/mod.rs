//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (hyper auto connection, peer address, drain)
//!     → pipeline::GatekeeperService (admit / reject / terminate)
//!     → upstream.rs (forward admitted requests to the application)
//!     → Send response to client
//! ```

pub mod server;
pub mod upstream;

pub use server::GatekeeperServer;
pub use upstream::{UpstreamError, UpstreamForwarder};
