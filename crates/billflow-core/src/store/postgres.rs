//! PostgreSQL-backed bill store implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::BillingError;
use crate::types::{BillMetadata, BillStatus, LineItemMetadata};

use super::{
    bill_detail_from_parts, BillDetail, BillRecord, BillStore, BillSummary, LineItemRecord,
};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/postgres");

/// PostgreSQL-backed bill store.
#[derive(Clone)]
pub struct PostgresBillStore {
    pool: PgPool,
}

impl PostgresBillStore {
    /// Create a new Postgres bill store from an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run all migrations against the pool.
    pub async fn migrate(&self) -> Result<(), BillingError> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| BillingError::DatabaseError {
                operation: "migrate".to_string(),
                details: format!("Failed to run migrations: {}", e),
            })
    }
}

#[async_trait]
impl BillStore for PostgresBillStore {
    async fn create_bill(
        &self,
        bill_id: &str,
        policy_type: &str,
        currency: &str,
        start_at: DateTime<Utc>,
        metadata: &BillMetadata,
    ) -> Result<(), BillingError> {
        let metadata_json = serde_json::to_string(metadata)?;
        sqlx::query(
            r#"
            INSERT INTO bills (bill_id, policy_type, status, currency, metadata, created_at, updated_at)
            VALUES ($1, $2, 'OPEN', $3, $4::jsonb, $5, $6)
            ON CONFLICT (bill_id) DO NOTHING
            "#,
        )
        .bind(bill_id)
        .bind(policy_type)
        .bind(currency)
        .bind(metadata_json)
        .bind(start_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn is_bill_exists(&self, bill_id: &str) -> Result<bool, BillingError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM bills WHERE bill_id = $1)")
                .bind(bill_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }

    async fn add_line_item(
        &self,
        bill_id: &str,
        amount: i64,
        metadata: &LineItemMetadata,
        line_item_id: &str,
    ) -> Result<bool, BillingError> {
        let metadata_json = serde_json::to_string(metadata)?;
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO line_items (line_item_id, bill_id, amount, metadata, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4::jsonb, 'ACTIVE', $5, $6)
            ON CONFLICT (line_item_id) DO NOTHING
            "#,
        )
        .bind(line_item_id)
        .bind(bill_id)
        .bind(amount)
        .bind(metadata_json)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_line_item(
        &self,
        bill_id: &str,
        line_item_id: &str,
        status: &str,
    ) -> Result<LineItemRecord, BillingError> {
        let record = sqlx::query_as::<_, LineItemRecord>(
            r#"
            UPDATE line_items
            SET status = $1, updated_at = $2
            WHERE line_item_id = $3 AND bill_id = $4 AND status = 'ACTIVE'
            RETURNING line_item_id, bill_id, amount, metadata::text AS metadata, status, created_at, updated_at
            "#,
        )
        .bind(status)
        .bind(Utc::now())
        .bind(line_item_id)
        .bind(bill_id)
        .fetch_optional(&self.pool)
        .await?;

        record.ok_or_else(|| BillingError::LineItemNotFound {
            bill_id: bill_id.to_string(),
            line_item_id: line_item_id.to_string(),
        })
    }

    async fn close_bill(&self, bill_id: &str, total_amount: i64) -> Result<(), BillingError> {
        let result = sqlx::query(
            r#"
            UPDATE bills
            SET status = $1,
                metadata = jsonb_set(metadata, '{total_amount}', to_jsonb($2::bigint)),
                closed_at = $3,
                updated_at = $4
            WHERE bill_id = $5
            "#,
        )
        .bind(BillStatus::Closed.as_str())
        .bind(total_amount)
        .bind(Utc::now())
        .bind(Utc::now())
        .bind(bill_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(BillingError::BillNotFound {
                bill_id: bill_id.to_string(),
            });
        }
        Ok(())
    }

    async fn get_bill(&self, bill_id: &str) -> Result<BillDetail, BillingError> {
        let record = sqlx::query_as::<_, BillRecord>(
            r#"
            SELECT bill_id, policy_type, status, currency, metadata::text AS metadata,
                   created_at, updated_at, closed_at
            FROM bills
            WHERE bill_id = $1
            "#,
        )
        .bind(bill_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| BillingError::BillNotFound {
            bill_id: bill_id.to_string(),
        })?;

        let line_items = sqlx::query_as::<_, LineItemRecord>(
            r#"
            SELECT line_item_id, bill_id, amount, metadata::text AS metadata, status, created_at, updated_at
            FROM line_items
            WHERE bill_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(bill_id)
        .fetch_all(&self.pool)
        .await?;

        bill_detail_from_parts(record, line_items)
    }

    async fn get_bills(
        &self,
        status: BillStatus,
        limit: i64,
        cursor: DateTime<Utc>,
    ) -> Result<(Vec<BillSummary>, bool), BillingError> {
        let records = sqlx::query_as::<_, BillRecord>(
            r#"
            SELECT bill_id, policy_type, status, currency, metadata::text AS metadata,
                   created_at, updated_at, closed_at
            FROM bills
            WHERE created_at < $1 AND status = $2
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(cursor)
        .bind(status.as_str())
        .bind(limit + 1)
        .fetch_all(&self.pool)
        .await?;

        let has_more = records.len() as i64 > limit;
        let mut bills = Vec::with_capacity(records.len().min(limit as usize));
        for record in records.into_iter().take(limit as usize) {
            bills.push(BillSummary::from_record(record)?);
        }

        Ok((bills, has_more))
    }
}
