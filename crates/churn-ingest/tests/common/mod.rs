//! Shared helpers for churn ingestion integration tests
//!
//! Each test gets its own Postgres container with the ingestion tables
//! created from `fixtures/schema.sql`. Docker must be running.

#![allow(dead_code)]

use anyhow::{Context, Result};
use churn_common::config::DatabaseConfig;
use churn_ingest::IngestConfig;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::path::Path;
use tempfile::TempDir;
use testcontainers::{runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tracing::info;

const SCHEMA_SQL: &str = include_str!("../fixtures/schema.sql");

pub const CUSTOMERS_HEADER: &str =
    "external_id,created_at,signup_source,country,region,city,plan_tier,is_active,attributes";
pub const EVENTS_HEADER: &str = "external_id,event_type,event_ts,properties,source_file";
pub const LABELS_HEADER: &str = "external_id,label,label_date,reason_code,notes";

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,churn_ingest=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Postgres container with the ingestion schema applied
pub struct TestStore {
    _container: ContainerAsync<Postgres>,
    pool: PgPool,
    database: DatabaseConfig,
}

impl TestStore {
    pub async fn start() -> Result<Self> {
        info!("Starting PostgreSQL test container...");

        let container = Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container.get_host().await?.to_string();
        let port = container.get_host_port_ipv4(5432).await?;

        let database = DatabaseConfig {
            host,
            port,
            ..DatabaseConfig::default()
        };

        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(&format!(
                "postgresql://postgres:postgres@{}:{}/postgres",
                database.host, database.port
            ))
            .await
            .context("Failed to connect to PostgreSQL")?;

        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&pool)
            .await
            .context("Failed to create ingestion schema")?;

        Ok(Self {
            _container: container,
            pool,
            database,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn database(&self) -> DatabaseConfig {
        self.database.clone()
    }

    /// Ingest configuration pointing at `data_dir` and this store
    pub fn config(&self, data_dir: &Path) -> IngestConfig {
        IngestConfig::new(data_dir, self.database())
    }

    pub async fn count(&self, table: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM churn.{table}"))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

/// Scratch directory for input CSV files
pub struct DataDir {
    dir: TempDir,
}

impl DataDir {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: TempDir::new()?,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `header` followed by `lines` to `name`
    pub fn write(&self, name: &str, header: &str, lines: &[&str]) -> Result<()> {
        let mut contents = String::from(header);
        contents.push('\n');
        for line in lines {
            contents.push_str(line);
            contents.push('\n');
        }
        std::fs::write(self.dir.path().join(name), contents)?;
        Ok(())
    }

    pub fn customers(&self, lines: &[&str]) -> Result<()> {
        self.write("customers.csv", CUSTOMERS_HEADER, lines)
    }

    pub fn events(&self, lines: &[&str]) -> Result<()> {
        self.write("events.csv", EVENTS_HEADER, lines)
    }

    pub fn labels(&self, lines: &[&str]) -> Result<()> {
        self.write("churn_labels.csv", LABELS_HEADER, lines)
    }

    pub fn remove(&self, name: &str) -> Result<()> {
        std::fs::remove_file(self.dir.path().join(name))?;
        Ok(())
    }
}
