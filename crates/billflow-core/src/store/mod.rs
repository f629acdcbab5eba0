//! Persistence interfaces and backends for billflow-core.
//!
//! This module defines the bill store abstraction and backend implementations.

pub mod postgres;
pub mod sqlite;

pub use self::postgres::PostgresBillStore;
pub use self::sqlite::SqliteBillStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::BillingError;
use crate::types::{BillMetadata, BillStatus, LineItemMetadata};

/// Bill row from the persistence layer.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BillRecord {
    /// Unique caller-supplied bill identifier.
    pub bill_id: String,
    /// Billing policy type (USAGE_BASED, SUBSCRIPTION).
    pub policy_type: String,
    /// Current status (OPEN, CLOSED).
    pub status: String,
    /// Bill currency code.
    pub currency: String,
    /// JSON metadata blob (recurring config, final total).
    pub metadata: String,
    /// When the billing period started.
    pub created_at: DateTime<Utc>,
    /// When the row was last written.
    pub updated_at: DateTime<Utc>,
    /// When the bill was closed (None while open).
    pub closed_at: Option<DateTime<Utc>>,
}

/// Line item row from the persistence layer.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LineItemRecord {
    /// Globally unique line item identifier (idempotency key).
    pub line_item_id: String,
    /// Bill this line item belongs to.
    pub bill_id: String,
    /// Charge amount in minor units.
    pub amount: i64,
    /// JSON metadata blob (description).
    pub metadata: String,
    /// Current status (ACTIVE, VOIDED).
    pub status: String,
    /// When the line item was created.
    pub created_at: DateTime<Utc>,
    /// When the row was last written.
    pub updated_at: DateTime<Utc>,
}

impl LineItemRecord {
    /// Parse the metadata JSON blob.
    pub fn parse_metadata(&self) -> Result<LineItemMetadata, BillingError> {
        if self.metadata.is_empty() {
            return Ok(LineItemMetadata::default());
        }
        Ok(serde_json::from_str(&self.metadata)?)
    }
}

/// A bill with its parsed metadata and line items.
#[derive(Debug, Clone)]
pub struct BillDetail {
    /// Unique bill identifier.
    pub bill_id: String,
    /// Current status (OPEN, CLOSED).
    pub status: String,
    /// Billing policy type.
    pub policy_type: String,
    /// Bill currency code.
    pub currency: String,
    /// Final total from metadata (zero until close commits).
    pub total_amount: i64,
    /// Recurring configuration, if the bill is a subscription.
    pub recurring: Option<crate::types::Recurring>,
    /// When the billing period started.
    pub created_at: DateTime<Utc>,
    /// When the bill was closed (None while open).
    pub closed_at: Option<DateTime<Utc>>,
    /// Line items, newest first.
    pub line_items: Vec<LineItemRecord>,
}

/// A bill row summarized for listings, with its metadata parsed.
#[derive(Debug, Clone)]
pub struct BillSummary {
    /// Unique bill identifier.
    pub bill_id: String,
    /// Current status (OPEN, CLOSED).
    pub status: String,
    /// Billing policy type.
    pub policy_type: String,
    /// Bill currency code.
    pub currency: String,
    /// Final total from metadata (zero until close commits).
    pub total_amount: i64,
    /// When the billing period started.
    pub created_at: DateTime<Utc>,
    /// When the bill was closed (None while open).
    pub closed_at: Option<DateTime<Utc>>,
}

impl BillSummary {
    /// Build a summary from a raw row, parsing the metadata blob.
    pub fn from_record(record: BillRecord) -> Result<Self, BillingError> {
        let metadata = parse_bill_metadata(&record.metadata)?;
        Ok(Self {
            bill_id: record.bill_id,
            status: record.status,
            policy_type: record.policy_type,
            currency: record.currency,
            total_amount: metadata.total_amount,
            created_at: record.created_at,
            closed_at: record.closed_at,
        })
    }
}

pub(crate) fn parse_bill_metadata(raw: &str) -> Result<BillMetadata, BillingError> {
    if raw.is_empty() {
        return Ok(BillMetadata::default());
    }
    Ok(serde_json::from_str(raw)?)
}

pub(crate) fn bill_detail_from_parts(
    record: BillRecord,
    line_items: Vec<LineItemRecord>,
) -> Result<BillDetail, BillingError> {
    let metadata = parse_bill_metadata(&record.metadata)?;
    Ok(BillDetail {
        bill_id: record.bill_id,
        status: record.status,
        policy_type: record.policy_type,
        currency: record.currency,
        total_amount: metadata.total_amount,
        recurring: metadata.recurring,
        created_at: record.created_at,
        closed_at: record.closed_at,
        line_items,
    })
}

/// Persistence contract used by the activity adapters and the API shim.
///
/// Mutating operations are idempotent where the workflow relies on replayed
/// delivery: bill and line-item inserts resolve conflicts to a no-op, and the
/// void transition is an atomic compare-and-swap on `status = 'ACTIVE'`.
#[async_trait]
pub trait BillStore: Send + Sync {
    /// Insert a bill row. A conflicting `bill_id` is a no-op, not an error.
    async fn create_bill(
        &self,
        bill_id: &str,
        policy_type: &str,
        currency: &str,
        start_at: DateTime<Utc>,
        metadata: &BillMetadata,
    ) -> Result<(), BillingError>;

    /// Fast existence check used before starting a workflow.
    async fn is_bill_exists(&self, bill_id: &str) -> Result<bool, BillingError>;

    /// Insert a line item keyed by `line_item_id`.
    ///
    /// Returns `true` if a row was inserted, `false` if the key already
    /// existed (duplicate delivery).
    async fn add_line_item(
        &self,
        bill_id: &str,
        amount: i64,
        metadata: &LineItemMetadata,
        line_item_id: &str,
    ) -> Result<bool, BillingError>;

    /// Transition an ACTIVE line item to the given status, returning the
    /// previous row. Fails with `LineItemNotFound` if no ACTIVE row matches.
    async fn update_line_item(
        &self,
        bill_id: &str,
        line_item_id: &str,
        status: &str,
    ) -> Result<LineItemRecord, BillingError>;

    /// Flip the bill to CLOSED and persist the final total.
    async fn close_bill(&self, bill_id: &str, total_amount: i64) -> Result<(), BillingError>;

    /// Fetch a bill with its line items.
    async fn get_bill(&self, bill_id: &str) -> Result<BillDetail, BillingError>;

    /// Cursor-paginate bills by status, newest first.
    ///
    /// Fetches `limit + 1` rows; the extra row only signals `has_more` and is
    /// not returned.
    async fn get_bills(
        &self,
        status: BillStatus,
        limit: i64,
        cursor: DateTime<Utc>,
    ) -> Result<(Vec<BillSummary>, bool), BillingError>;
}
