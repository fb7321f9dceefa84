//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatekeeperConfig (validated, immutable)
//!     → consumed once while building the pipeline
//! ```
//!
//! # Design Decisions
//! - Config is static once loaded; there is no hot reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AccessLogConfig, AdminConfig, ApiConfig, ClassifierConfig, ClientAddressConfig,
    ExceededPolicy, GatekeeperConfig, ListenerConfig, ObservabilityConfig, RateLimitConfig,
    RateWindowConfig, ReputationConfig, SecurityConfig, UploadConfig, UpstreamConfig,
};
