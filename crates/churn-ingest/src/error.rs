//! Error types for churn ingestion

use churn_common::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Step of the ingest transaction a store failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Begin,
    Truncate,
    UpsertCustomers,
    ResolveIdentities,
    LoadEvents,
    LoadLabels,
    Commit,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Begin => "begin transaction",
            Stage::Truncate => "truncate",
            Stage::UpsertCustomers => "upsert customers",
            Stage::ResolveIdentities => "resolve identities",
            Stage::LoadEvents => "load events",
            Stage::LoadLabels => "load labels",
            Stage::Commit => "commit",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything that can abort an ingest run
///
/// Rows whose `external_id` does not resolve are not errors; they are
/// counted in [`crate::LoadStats::dropped`].
#[derive(Error, Debug)]
pub enum IngestError {
    /// A non-empty input file lacks required columns
    #[error("{file}: missing required columns [{}]", .missing.join(", "))]
    Schema { file: String, missing: Vec<String> },

    /// The store could not be reached
    #[error("Failed to connect to {url}: {source}")]
    Connection {
        url: String,
        #[source]
        source: sqlx::Error,
    },

    /// A statement failed inside the ingest transaction
    #[error("Store write failed during {stage}: {source}")]
    StoreWrite {
        stage: Stage,
        #[source]
        source: sqlx::Error,
    },

    /// An input file is not valid CSV / UTF-8
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to open {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl IngestError {
    /// Adapter for `map_err` on store calls made during `stage`
    pub(crate) fn store(stage: Stage) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| IngestError::StoreWrite { stage, source }
    }

    /// The transaction stage that failed, if this is a store write failure
    pub fn stage(&self) -> Option<Stage> {
        match self {
            IngestError::StoreWrite { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_lists_every_missing_column() {
        let err = IngestError::Schema {
            file: "customers.csv".to_string(),
            missing: vec!["region".to_string(), "city".to_string()],
        };
        assert_eq!(err.to_string(), "customers.csv: missing required columns [region, city]");
    }

    #[test]
    fn test_store_write_names_stage() {
        let err = IngestError::store(Stage::LoadLabels)(sqlx::Error::RowNotFound);
        assert_eq!(err.stage(), Some(Stage::LoadLabels));
        assert!(err.to_string().starts_with("Store write failed during load labels"));
    }
}
