//! Ingest orchestration
//!
//! One run moves through a fixed sequence inside a single transaction:
//!
//! ```text
//! [truncate] -> upsert customers -> resolve identities -> load events -> load labels -> commit
//! ```
//!
//! Column checks for all three files happen before the transaction is
//! opened. A failure at any stage rolls the whole transaction back, so a run
//! either lands completely or leaves the store untouched.

use churn_common::config::DatabaseConfig;
use sqlx::postgres::PgConnectOptions;
use sqlx::{Connection, PgConnection};
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::IngestConfig;
use crate::error::{IngestError, Result, Stage};
use crate::identity::{IdentityResolver, StoreIdentityResolver};
use crate::models::{
    CustomerRecord, EventRow, LabelRow, CUSTOMER_COLUMNS, EVENT_COLUMNS, LABEL_COLUMNS,
};
use crate::reader::RowReader;
use crate::storage::{ChurnStorage, LoadStats, Tables};

/// Input files opened and column-checked, ready to load
pub struct IngestInputs {
    pub customers: RowReader,
    pub events: RowReader,
    pub labels: RowReader,
}

impl IngestInputs {
    /// Open all three files and check their headers
    ///
    /// Missing files read as empty. Fails with [`IngestError::Schema`] on the
    /// first file that has data but lacks a required column.
    pub fn open(config: &IngestConfig) -> Result<Self> {
        let mut customers = RowReader::open(config.customers_path())?;
        let mut events = RowReader::open(config.events_path())?;
        let mut labels = RowReader::open(config.labels_path())?;

        customers.require_columns(&CUSTOMER_COLUMNS)?;
        events.require_columns(&EVENT_COLUMNS)?;
        labels.require_columns(&LABEL_COLUMNS)?;

        Ok(Self {
            customers,
            events,
            labels,
        })
    }
}

/// Outcome of a committed run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub customers: LoadStats,
    pub events: LoadStats,
    pub labels: LoadStats,
    pub full_refresh: bool,
}

impl std::fmt::Display for IngestSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Ingest complete. {} customers, {} events, {} labels processed.",
            self.customers.written, self.events.written, self.labels.written
        )
    }
}

/// Open the single store connection used for a run
pub async fn connect(database: &DatabaseConfig) -> Result<PgConnection> {
    let options = PgConnectOptions::new()
        .host(&database.host)
        .port(database.port)
        .database(&database.database)
        .username(&database.user)
        .password(&database.password);

    PgConnection::connect_with(&options)
        .await
        .map_err(|source| IngestError::Connection {
            url: database.redacted_url(),
            source,
        })
}

/// Customer / event / label ingestion over one transaction
pub struct IngestPipeline<R = StoreIdentityResolver> {
    config: IngestConfig,
    storage: ChurnStorage,
    resolver: R,
}

impl IngestPipeline<StoreIdentityResolver> {
    /// Pipeline resolving identities from the customers table
    pub fn new(config: IngestConfig) -> Result<Self> {
        config.validate()?;
        let tables = Tables::new(&config.database);
        let resolver = StoreIdentityResolver::new(tables.customers.clone());
        Ok(Self {
            storage: ChurnStorage::new(tables, config.batch),
            config,
            resolver,
        })
    }
}

impl<R: IdentityResolver> IngestPipeline<R> {
    /// Swap the identity resolver, e.g. for a test double
    pub fn with_resolver<R2: IdentityResolver>(self, resolver: R2) -> IngestPipeline<R2> {
        IngestPipeline {
            config: self.config,
            storage: self.storage,
            resolver,
        }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Check inputs, connect, load, and close the connection
    ///
    /// Nothing touches the store if an input file fails its column check.
    pub async fn run(&self) -> Result<IngestSummary> {
        let inputs = IngestInputs::open(&self.config)?;

        let mut conn = connect(&self.config.database).await?;
        info!(store = %self.config.database.redacted_url(), "Connected to store");

        let result = self.load(&mut conn, inputs).await;

        if let Err(e) = conn.close().await {
            warn!(error = %e, "Failed to close store connection cleanly");
        }

        result
    }

    /// Load already-opened inputs over `conn` in one transaction
    pub async fn load(&self, conn: &mut PgConnection, inputs: IngestInputs) -> Result<IngestSummary> {
        let mut tx = conn.begin().await.map_err(IngestError::store(Stage::Begin))?;

        match self.load_stages(&mut *tx, inputs).await {
            Ok(summary) => {
                tx.commit().await.map_err(IngestError::store(Stage::Commit))?;
                info!(
                    customers = summary.customers.written,
                    events = summary.events.written,
                    events_dropped = summary.events.dropped,
                    labels = summary.labels.written,
                    labels_dropped = summary.labels.dropped,
                    "Ingest committed"
                );
                Ok(summary)
            },
            Err(e) => {
                warn!(error = %e, "Ingest failed, rolling back");
                if let Err(rollback) = tx.rollback().await {
                    error!(error = %rollback, "Rollback failed");
                }
                Err(e)
            },
        }
    }

    async fn load_stages(
        &self,
        conn: &mut PgConnection,
        inputs: IngestInputs,
    ) -> Result<IngestSummary> {
        let IngestInputs {
            customers,
            events,
            labels,
        } = inputs;

        if self.config.full_refresh {
            self.storage
                .truncate_dependents(conn)
                .instrument(info_span!("stage", name = %Stage::Truncate))
                .await?;
        }

        let customer_records = customers
            .map(|row| row.map(|row| CustomerRecord::from(&row)))
            .collect::<Result<Vec<_>>>()?;
        let customer_stats = self
            .storage
            .upsert_customers(conn, &customer_records)
            .instrument(info_span!("stage", name = %Stage::UpsertCustomers))
            .await?;

        // Must follow the upsert so this run's new customers resolve.
        let ids = self
            .resolver
            .resolve(conn)
            .instrument(info_span!("stage", name = %Stage::ResolveIdentities))
            .await?;

        let source_file = events.path().display().to_string();
        let event_rows = events
            .map(|row| row.map(|row| EventRow::from(&row)))
            .collect::<Result<Vec<_>>>()?;
        let event_stats = self
            .storage
            .load_events(conn, event_rows, &ids, &source_file)
            .instrument(info_span!("stage", name = %Stage::LoadEvents))
            .await?;

        let label_rows = labels
            .map(|row| row.map(|row| LabelRow::from(&row)))
            .collect::<Result<Vec<_>>>()?;
        let label_stats = self
            .storage
            .load_labels(conn, label_rows, &ids)
            .instrument(info_span!("stage", name = %Stage::LoadLabels))
            .await?;

        Ok(IngestSummary {
            customers: customer_stats,
            events: event_stats,
            labels: label_stats,
            full_refresh: self.config.full_refresh,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_summary_line_reports_written_rows() {
        let summary = IngestSummary {
            customers: LoadStats {
                read: 1,
                written: 1,
                ..LoadStats::default()
            },
            events: LoadStats {
                read: 2,
                written: 1,
                dropped: 1,
                statements: 1,
            },
            labels: LoadStats::default(),
            full_refresh: false,
        };
        assert_eq!(
            summary.to_string(),
            "Ingest complete. 1 customers, 1 events, 0 labels processed."
        );
    }

    #[test]
    fn test_inputs_fail_fast_on_missing_columns() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("customers.csv"),
            "external_id,created_at\nC1,2024-01-01\n",
        )
        .unwrap();

        let config = IngestConfig::new(dir.path(), DatabaseConfig::default());
        let err = IngestInputs::open(&config).err().unwrap();
        match err {
            IngestError::Schema { file, missing } => {
                assert_eq!(file, "customers.csv");
                assert_eq!(missing.len(), 7);
                assert_eq!(missing[0], "signup_source");
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_inputs_tolerate_missing_files() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("churn_labels.csv"),
            "external_id,label,label_date,reason_code,notes\nC1,true,2024-01-01,price,\n",
        )
        .unwrap();

        let config = IngestConfig::new(dir.path(), DatabaseConfig::default());
        let mut inputs = IngestInputs::open(&config).unwrap();
        assert!(inputs.customers.next().is_none());
        assert!(inputs.events.next().is_none());
        assert_eq!(inputs.labels.count(), 1);
    }

    #[test]
    fn test_pipeline_rejects_invalid_config() {
        let config = IngestConfig::new(
            "data/raw",
            DatabaseConfig {
                schema: "no-dashes".to_string(),
                ..DatabaseConfig::default()
            },
        );
        assert!(matches!(IngestPipeline::new(config), Err(IngestError::Config(_))));
    }
}
