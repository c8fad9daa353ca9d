//! Entity records built from CSV rows
//!
//! Values stay as text; the store casts them to column types. Empty fields
//! become NULL, except `external_id` which is kept verbatim. A customer row
//! too short to carry `external_id` binds NULL and the store rejects it.

use uuid::Uuid;

use crate::identity::IdentityMap;
use crate::reader::Row;

pub const CUSTOMER_COLUMNS: [&str; 9] = [
    "external_id",
    "created_at",
    "signup_source",
    "country",
    "region",
    "city",
    "plan_tier",
    "is_active",
    "attributes",
];

pub const EVENT_COLUMNS: [&str; 5] = [
    "external_id",
    "event_type",
    "event_ts",
    "properties",
    "source_file",
];

pub const LABEL_COLUMNS: [&str; 5] = ["external_id", "label", "label_date", "reason_code", "notes"];

fn external_id(row: &Row) -> String {
    row.get("external_id").unwrap_or_default().to_string()
}

/// Customer row, keyed by `external_id`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerRecord {
    pub external_id: Option<String>,
    pub created_at: Option<String>,
    pub signup_source: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub plan_tier: Option<String>,
    pub is_active: Option<String>,
    pub attributes: Option<String>,
}

impl From<&Row> for CustomerRecord {
    fn from(row: &Row) -> Self {
        Self {
            external_id: row.get("external_id").map(str::to_string),
            created_at: row.non_empty("created_at"),
            signup_source: row.non_empty("signup_source"),
            country: row.non_empty("country"),
            region: row.non_empty("region"),
            city: row.non_empty("city"),
            plan_tier: row.non_empty("plan_tier"),
            is_active: row.non_empty("is_active"),
            attributes: row.non_empty("attributes"),
        }
    }
}

/// Event row as read, before identity resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRow {
    pub external_id: String,
    pub event_type: Option<String>,
    pub event_ts: Option<String>,
    pub properties: Option<String>,
}

impl From<&Row> for EventRow {
    fn from(row: &Row) -> Self {
        Self {
            external_id: external_id(row),
            event_type: row.non_empty("event_type"),
            event_ts: row.non_empty("event_ts"),
            properties: row.non_empty("properties"),
        }
    }
}

/// Event ready to insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub customer_id: Uuid,
    pub event_type: Option<String>,
    pub event_ts: Option<String>,
    pub properties: Option<String>,
}

impl EventRow {
    /// `None` when the customer is unknown
    pub fn resolve(self, ids: &IdentityMap) -> Option<EventRecord> {
        let customer_id = ids.get(&self.external_id)?;
        Some(EventRecord {
            customer_id,
            event_type: self.event_type,
            event_ts: self.event_ts,
            properties: self.properties,
        })
    }
}

/// Churn label row as read, before identity resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelRow {
    pub external_id: String,
    pub label: Option<String>,
    pub label_date: Option<String>,
    pub reason_code: Option<String>,
    pub notes: Option<String>,
}

impl From<&Row> for LabelRow {
    fn from(row: &Row) -> Self {
        Self {
            external_id: external_id(row),
            label: row.non_empty("label"),
            label_date: row.non_empty("label_date"),
            reason_code: row.non_empty("reason_code"),
            notes: row.non_empty("notes"),
        }
    }
}

/// Churn label ready to upsert, unique per (customer_id, label_date)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelRecord {
    pub customer_id: Uuid,
    pub label: Option<String>,
    pub label_date: Option<String>,
    pub reason_code: Option<String>,
    pub notes: Option<String>,
}

impl LabelRow {
    /// `None` when the customer is unknown
    pub fn resolve(self, ids: &IdentityMap) -> Option<LabelRecord> {
        let customer_id = ids.get(&self.external_id)?;
        Some(LabelRecord {
            customer_id,
            label: self.label,
            label_date: self.label_date,
            reason_code: self.reason_code,
            notes: self.notes,
        })
    }
}
