//! Churn Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Ambient pieces shared by the churn workspace members:
//!
//! - **Logging**: `tracing` subscriber setup driven by `LOG_*` variables
//! - **Configuration**: store connection settings loaded from the environment
//! - **Errors**: the configuration error type
//!
//! # Example
//!
//! ```no_run
//! use churn_common::config::DatabaseConfig;
//! use churn_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     let db = DatabaseConfig::from_env()?;
//!     tracing::info!(url = %db.redacted_url(), "Store configured");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;

pub use error::{ConfigError, Result};
