//! Ingest run configuration

use churn_common::config::DatabaseConfig;
use churn_common::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;

/// Default directory holding the input CSV files.
pub const DEFAULT_DATA_DIR: &str = "data/raw";

pub const DEFAULT_CUSTOMERS_FILE: &str = "customers.csv";
pub const DEFAULT_EVENTS_FILE: &str = "events.csv";
pub const DEFAULT_LABELS_FILE: &str = "churn_labels.csv";

// Rows per statement. Tuning knobs only; results do not depend on them.
pub const DEFAULT_CUSTOMER_BATCH_SIZE: usize = 500;
pub const DEFAULT_EVENT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_LABEL_BATCH_SIZE: usize = 500;

/// File names looked up inside the data directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestFiles {
    pub customers: String,
    pub events: String,
    pub labels: String,
}

impl Default for IngestFiles {
    fn default() -> Self {
        Self {
            customers: DEFAULT_CUSTOMERS_FILE.to_string(),
            events: DEFAULT_EVENTS_FILE.to_string(),
            labels: DEFAULT_LABELS_FILE.to_string(),
        }
    }
}

/// Maximum rows bound into a single statement, per entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSizes {
    pub customers: usize,
    pub events: usize,
    pub labels: usize,
}

impl Default for BatchSizes {
    fn default() -> Self {
        Self {
            customers: DEFAULT_CUSTOMER_BATCH_SIZE,
            events: DEFAULT_EVENT_BATCH_SIZE,
            labels: DEFAULT_LABEL_BATCH_SIZE,
        }
    }
}

/// Everything one ingest run needs, passed in explicitly
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub data_dir: PathBuf,
    /// Clear events and churn labels before loading
    pub full_refresh: bool,
    pub files: IngestFiles,
    pub batch: BatchSizes,
    pub database: DatabaseConfig,
}

impl IngestConfig {
    pub fn new(data_dir: impl Into<PathBuf>, database: DatabaseConfig) -> Self {
        Self {
            data_dir: data_dir.into(),
            full_refresh: false,
            files: IngestFiles::default(),
            batch: BatchSizes::default(),
            database,
        }
    }

    pub fn with_full_refresh(mut self, full_refresh: bool) -> Self {
        self.full_refresh = full_refresh;
        self
    }

    pub fn with_batch_sizes(mut self, batch: BatchSizes) -> Self {
        self.batch = batch;
        self
    }

    pub fn with_files(mut self, files: IngestFiles) -> Self {
        self.files = files;
        self
    }

    pub fn customers_path(&self) -> PathBuf {
        self.data_dir.join(&self.files.customers)
    }

    pub fn events_path(&self) -> PathBuf {
        self.data_dir.join(&self.files.events)
    }

    pub fn labels_path(&self) -> PathBuf {
        self.data_dir.join(&self.files.labels)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.database.validate()?;

        for (name, size) in [
            ("customer batch size", self.batch.customers),
            ("event batch size", self.batch.events),
            ("label batch size", self.batch.labels),
        ] {
            if size == 0 {
                return Err(ConfigError::Zero(name.to_string()).into());
            }
        }

        Ok(())
    }
}
