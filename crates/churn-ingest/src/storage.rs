// Churn Storage Layer
//
// Bulk statements against the customers, events and churn_labels tables.
// Every method runs on the caller's connection, which the pipeline points
// at its open transaction; nothing here commits.

use chrono::NaiveDate;
use churn_common::config::DatabaseConfig;
use sqlx::{PgConnection, Postgres, QueryBuilder};
use tracing::{debug, info, instrument};

use crate::batch::partition_by_key;
use crate::config::BatchSizes;
use crate::error::{IngestError, Result, Stage};
use crate::identity::IdentityMap;
use crate::models::{CustomerRecord, EventRecord, EventRow, LabelRecord, LabelRow};

/// Per-entity counters for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Rows read from the file
    pub read: usize,
    /// Rows sent to the store
    pub written: usize,
    /// Rows skipped because their `external_id` did not resolve
    pub dropped: usize,
    /// Statements executed
    pub statements: usize,
}

/// Schema-qualified table names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tables {
    pub customers: String,
    pub events: String,
    pub labels: String,
}

impl Tables {
    pub fn new(database: &DatabaseConfig) -> Self {
        Self {
            customers: database.table("customers"),
            events: database.table("events"),
            labels: database.table("churn_labels"),
        }
    }
}

/// Resolve event rows, returning the resolved events and the orphan count
pub fn resolve_events(rows: Vec<EventRow>, ids: &IdentityMap) -> (Vec<EventRecord>, usize) {
    let total = rows.len();
    let events: Vec<EventRecord> = rows.into_iter().filter_map(|row| row.resolve(ids)).collect();
    let dropped = total - events.len();
    (events, dropped)
}

/// Resolve label rows, returning the resolved labels and the orphan count
pub fn resolve_labels(rows: Vec<LabelRow>, ids: &IdentityMap) -> (Vec<LabelRecord>, usize) {
    let total = rows.len();
    let labels: Vec<LabelRecord> = rows.into_iter().filter_map(|row| row.resolve(ids)).collect();
    let dropped = total - labels.len();
    (labels, dropped)
}

/// Conflict key of a `label_date` as the store compares it after `::date`
///
/// Spellings such as `2024-03-01` and `2024-3-1` name the same day. Text that
/// does not parse is compared verbatim and left for the store to reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelDateKey<'a> {
    Date(NaiveDate),
    Raw(&'a str),
    Missing,
}

impl<'a> LabelDateKey<'a> {
    pub fn new(label_date: Option<&'a str>) -> Self {
        match label_date.map(str::trim) {
            None => LabelDateKey::Missing,
            Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map(LabelDateKey::Date)
                .unwrap_or(LabelDateKey::Raw(raw)),
        }
    }
}

/// Storage handler for one ingest run
pub struct ChurnStorage {
    tables: Tables,
    batch: BatchSizes,
}

impl ChurnStorage {
    pub fn new(tables: Tables, batch: BatchSizes) -> Self {
        Self { tables, batch }
    }

    pub fn tables(&self) -> &Tables {
        &self.tables
    }

    fn event_batches<'a>(&self, events: &'a [EventRecord]) -> std::slice::Chunks<'a, EventRecord> {
        events.chunks(self.batch.events.max(1))
    }

    // ========================================================================
    // Full refresh
    // ========================================================================

    /// Empty the dependent tables; customers are never truncated
    ///
    /// Only `events` restarts its identity sequence.
    #[instrument(skip_all)]
    pub async fn truncate_dependents(&self, conn: &mut PgConnection) -> Result<()> {
        sqlx::query(&format!("TRUNCATE {} RESTART IDENTITY CASCADE", self.tables.events))
            .execute(&mut *conn)
            .await
            .map_err(IngestError::store(Stage::Truncate))?;

        sqlx::query(&format!("TRUNCATE {}", self.tables.labels))
            .execute(&mut *conn)
            .await
            .map_err(IngestError::store(Stage::Truncate))?;

        info!(
            events = %self.tables.events,
            labels = %self.tables.labels,
            "Truncated dependent tables"
        );
        Ok(())
    }

    // ========================================================================
    // Customers
    // ========================================================================

    /// Insert-or-update customers keyed on `external_id`, in file order
    #[instrument(skip_all, fields(rows = customers.len()))]
    pub async fn upsert_customers(
        &self,
        conn: &mut PgConnection,
        customers: &[CustomerRecord],
    ) -> Result<LoadStats> {
        let mut stats = LoadStats {
            read: customers.len(),
            ..LoadStats::default()
        };

        let batches = partition_by_key(customers, self.batch.customers, |c| c.external_id.as_deref());
        let total = batches.len();

        for (idx, batch) in batches.into_iter().enumerate() {
            debug!("Upserting customers batch {} / {} ({} rows)", idx + 1, total, batch.len());

            self.customers_statement(batch)
                .build()
                .execute(&mut *conn)
                .await
                .map_err(IngestError::store(Stage::UpsertCustomers))?;

            stats.written += batch.len();
            stats.statements += 1;
        }

        info!(
            written = stats.written,
            statements = stats.statements,
            "Upserted customers"
        );
        Ok(stats)
    }

    fn customers_statement<'a>(&self, batch: &'a [CustomerRecord]) -> QueryBuilder<'a, Postgres> {
        let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            r#"
            INSERT INTO {} (
                external_id,
                created_at,
                signup_source,
                country,
                region,
                city,
                plan_tier,
                is_active,
                attributes
            )
            "#,
            self.tables.customers
        ));

        query_builder.push_values(batch, |mut b, customer| {
            b.push_bind(customer.external_id.as_deref())
                .push_bind(customer.created_at.as_deref())
                .push_unseparated("::timestamptz")
                .push_bind(customer.signup_source.as_deref())
                .push_bind(customer.country.as_deref())
                .push_bind(customer.region.as_deref())
                .push_bind(customer.city.as_deref())
                .push_bind(customer.plan_tier.as_deref())
                .push_bind(customer.is_active.as_deref())
                .push_unseparated("::boolean")
                .push_bind(customer.attributes.as_deref())
                .push_unseparated("::jsonb");
        });

        query_builder.push(
            r#"
            ON CONFLICT (external_id)
            DO UPDATE SET
                created_at = EXCLUDED.created_at,
                signup_source = EXCLUDED.signup_source,
                country = EXCLUDED.country,
                region = EXCLUDED.region,
                city = EXCLUDED.city,
                plan_tier = EXCLUDED.plan_tier,
                is_active = EXCLUDED.is_active,
                attributes = EXCLUDED.attributes,
                updated_at = NOW()
            "#,
        );

        query_builder
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Insert resolvable events, tagging each with `source_file`
    ///
    /// Events have no uniqueness constraint, so loading the same file twice
    /// without a full refresh duplicates them.
    #[instrument(skip_all, fields(rows = rows.len(), source_file = %source_file))]
    pub async fn load_events(
        &self,
        conn: &mut PgConnection,
        rows: Vec<EventRow>,
        ids: &IdentityMap,
        source_file: &str,
    ) -> Result<LoadStats> {
        let read = rows.len();
        let (events, dropped) = resolve_events(rows, ids);
        let mut stats = LoadStats {
            read,
            dropped,
            ..LoadStats::default()
        };

        for batch in self.event_batches(&events) {
            let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                "INSERT INTO {} (customer_id, event_type, event_ts, properties, source_file) ",
                self.tables.events
            ));

            query_builder.push_values(batch, |mut b, event| {
                b.push_bind(event.customer_id)
                    .push_bind(event.event_type.as_deref())
                    .push_bind(event.event_ts.as_deref())
                    .push_unseparated("::timestamptz")
                    .push_bind(event.properties.as_deref())
                    .push_unseparated("::jsonb")
                    .push_bind(source_file);
            });

            query_builder
                .build()
                .execute(&mut *conn)
                .await
                .map_err(IngestError::store(Stage::LoadEvents))?;

            stats.written += batch.len();
            stats.statements += 1;
        }

        info!(
            written = stats.written,
            dropped = stats.dropped,
            statements = stats.statements,
            "Loaded events"
        );
        Ok(stats)
    }

    // ========================================================================
    // Churn labels
    // ========================================================================

    /// Insert-or-update resolvable labels keyed on (customer_id, label_date)
    #[instrument(skip_all, fields(rows = rows.len()))]
    pub async fn load_labels(
        &self,
        conn: &mut PgConnection,
        rows: Vec<LabelRow>,
        ids: &IdentityMap,
    ) -> Result<LoadStats> {
        let read = rows.len();
        let (labels, dropped) = resolve_labels(rows, ids);
        let mut stats = LoadStats {
            read,
            dropped,
            ..LoadStats::default()
        };

        let batches = partition_by_key(&labels, self.batch.labels, |label| {
            (label.customer_id, LabelDateKey::new(label.label_date.as_deref()))
        });

        for batch in batches {
            let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                "INSERT INTO {} (customer_id, label, label_date, reason_code, notes) ",
                self.tables.labels
            ));

            query_builder.push_values(batch, |mut b, label| {
                b.push_bind(label.customer_id)
                    .push_bind(label.label.as_deref())
                    .push_unseparated("::boolean")
                    .push_bind(label.label_date.as_deref())
                    .push_unseparated("::date")
                    .push_bind(label.reason_code.as_deref())
                    .push_bind(label.notes.as_deref());
            });

            query_builder.push(
                r#"
                ON CONFLICT (customer_id, label_date)
                DO UPDATE SET
                    label = EXCLUDED.label,
                    reason_code = EXCLUDED.reason_code,
                    notes = EXCLUDED.notes
                "#,
            );

            query_builder
                .build()
                .execute(&mut *conn)
                .await
                .map_err(IngestError::store(Stage::LoadLabels))?;

            stats.written += batch.len();
            stats.statements += 1;
        }

        info!(
            written = stats.written,
            dropped = stats.dropped,
            statements = stats.statements,
            "Loaded churn labels"
        );
        Ok(stats)
    }
}
