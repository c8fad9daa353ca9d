//! Churn Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Loads customers, events and churn labels from CSV files into Postgres.
//!
//! - **Customers** are upserted on `external_id`; the last occurrence wins.
//! - **Events** and **churn labels** are attached to customers through the
//!   internal `customer_id`. Rows whose `external_id` is unknown are dropped
//!   and counted, never stored as dangling references.
//! - A run is one transaction: it commits completely or not at all.
//!
//! # Example
//!
//! ```no_run
//! use churn_common::config::DatabaseConfig;
//! use churn_ingest::{IngestConfig, IngestPipeline};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::new("data/raw", DatabaseConfig::from_env()?)
//!         .with_full_refresh(true);
//!     let summary = IngestPipeline::new(config)?.run().await?;
//!     println!("{summary}");
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod identity;
pub mod models;
pub mod pipeline;
pub mod reader;
pub mod storage;

pub use config::{BatchSizes, IngestConfig, IngestFiles};
pub use error::{IngestError, Result, Stage};
pub use identity::{IdentityMap, IdentityResolver, StoreIdentityResolver};
pub use pipeline::{connect, IngestInputs, IngestPipeline, IngestSummary};
pub use reader::{Row, RowReader};
pub use storage::{ChurnStorage, LabelDateKey, LoadStats, Tables};
