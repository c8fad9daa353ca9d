//! External id -> internal customer id resolution

use async_trait::async_trait;
use sqlx::PgConnection;
use std::collections::HashMap;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::{IngestError, Result, Stage};

/// Snapshot of `external_id -> customer_id` taken inside the ingest transaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityMap {
    ids: HashMap<String, Uuid>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, external_id: &str) -> Option<Uuid> {
        self.ids.get(external_id).copied()
    }

    pub fn insert(&mut self, external_id: impl Into<String>, customer_id: Uuid) {
        self.ids.insert(external_id.into(), customer_id);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl FromIterator<(String, Uuid)> for IdentityMap {
    fn from_iter<I: IntoIterator<Item = (String, Uuid)>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

/// Source of the identity mapping used by the dependent loaders
///
/// Called once per run, after the customer upsert, on the same transaction,
/// so customers inserted in this run are visible. Implementations must not
/// reuse a mapping from an earlier run.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, conn: &mut PgConnection) -> Result<IdentityMap>;
}

/// Reads every customer with a non-null `external_id` from the store
#[derive(Debug, Clone)]
pub struct StoreIdentityResolver {
    customers_table: String,
}

impl StoreIdentityResolver {
    /// `customers_table` is schema-qualified, e.g. `churn.customers`
    pub fn new(customers_table: impl Into<String>) -> Self {
        Self {
            customers_table: customers_table.into(),
        }
    }
}

#[async_trait]
impl IdentityResolver for StoreIdentityResolver {
    #[instrument(skip_all, fields(table = %self.customers_table))]
    async fn resolve(&self, conn: &mut PgConnection) -> Result<IdentityMap> {
        let sql = format!(
            "SELECT external_id, customer_id FROM {} WHERE external_id IS NOT NULL",
            self.customers_table
        );

        let pairs: Vec<(String, Uuid)> = sqlx::query_as(&sql)
            .fetch_all(&mut *conn)
            .await
            .map_err(IngestError::store(Stage::ResolveIdentities))?;

        let ids: IdentityMap = pairs.into_iter().collect();
        debug!(customers = ids.len(), "Resolved customer identities");
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_lookup() {
        let id = Uuid::new_v4();
        let mut ids = IdentityMap::new();
        assert!(ids.is_empty());

        ids.insert("C1", id);
        assert_eq!(ids.get("C1"), Some(id));
        assert_eq!(ids.get("c1"), None);
        assert_eq!(ids.len(), 1);
    }
}
