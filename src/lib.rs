//! Request-admission gatekeeper.
//!
//! Every inbound request is resolved to a client address, checked against
//! the ban list, classified by path, policed per surface, rate limited and
//! sanitized before it may reach the protected application. Classified
//! attacks drop the connection without a response and escalate the client
//! toward a temporary ban.

pub mod admin;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod pipeline;
pub mod security;

pub use config::GatekeeperConfig;
pub use lifecycle::{Gateway, Shutdown};
pub use pipeline::{Decision, Gatekeeper, GatekeeperLayer, TerminateReason};
