//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RouterConfig (validated)
//!     → RouteTable::from_config (compiled, immutable)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → reload.rs compiles and atomically swaps the published table
//!     → in-flight requests keep the table they started with
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All optional fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod reload;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use reload::TableReloader;
pub use schema::{
    HeaderValueConfig, ObservabilityConfig, RetryPolicyConfig, RouteConfig, RouterConfig,
    VirtualHostConfig,
};
pub use validation::ValidationError;
