// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Activity adapters: the side-effecting operations invoked by workflows.
//!
//! Each activity is retried by the runtime under [`crate::runtime::ActivityOptions`];
//! activities are therefore written to be idempotent under at-least-once
//! delivery. Non-deterministic values (wall-clock timestamps, host UUIDs)
//! are allowed here and only here.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::error::BillingError;
use crate::store::{BillStore, LineItemRecord};
use crate::types::{format_amount, BillMetadata, LineItemMetadata};
use crate::workflow::{BillLifecycleRequest, BillResponse, BillState, LineItemResponse};

/// Errors surfaced by activities, classified for the retry executor.
#[derive(Debug, Clone, Error)]
pub enum ActivityError {
    /// The target row is absent or no longer in the expected state.
    /// Never retried: repeating the call cannot succeed.
    #[error("not found: {0}")]
    NotFound(String),

    /// A constraint or validation failure. Never retried: this is a
    /// programming error, not an infrastructure hiccup.
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// A transient failure (connection, timeout). Retried with backoff.
    #[error("{0}")]
    Transient(String),
}

impl ActivityError {
    /// True if the retry executor should attempt this activity again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<BillingError> for ActivityError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::BillNotFound { .. }
            | BillingError::LineItemNotFound { .. }
            | BillingError::WorkflowNotFound { .. } => ActivityError::NotFound(err.to_string()),
            BillingError::ValidationError { .. } | BillingError::UnsupportedPolicyType { .. } => {
                ActivityError::Constraint(err.to_string())
            }
            other => ActivityError::Transient(other.to_string()),
        }
    }
}

/// Side-effect adapters over the bill store and external integrations.
pub struct Activities {
    store: Arc<dyn BillStore>,
}

impl Activities {
    /// Create the activity set over a bill store.
    pub fn new(store: Arc<dyn BillStore>) -> Self {
        Self { store }
    }

    /// The underlying store, for callers that read outside a workflow.
    pub fn store(&self) -> &Arc<dyn BillStore> {
        &self.store
    }

    /// Insert the bill row. Idempotent by construction: a conflicting
    /// `bill_id` resolves to a no-op.
    pub async fn create_bill(&self, req: &BillLifecycleRequest) -> Result<(), ActivityError> {
        let mut metadata = BillMetadata::default();
        if let Some(recurring) = &req.recurring {
            if recurring.amount > 0 && !recurring.interval.is_zero() {
                metadata.recurring = Some(recurring.clone());
            }
        }

        self.store
            .create_bill(
                &req.bill_id,
                req.policy_type.as_str(),
                req.currency.as_str(),
                req.billing_period_start,
                &metadata,
            )
            .await?;
        Ok(())
    }

    /// Insert a line item keyed by `line_item_id`.
    ///
    /// Returns whether a row was actually inserted; a duplicate key is a
    /// successful no-op so redelivered signals and activity retries never
    /// double-charge.
    pub async fn add_line_item(
        &self,
        bill_id: &str,
        amount: i64,
        metadata: Option<&LineItemMetadata>,
        line_item_id: &str,
    ) -> Result<bool, ActivityError> {
        let default_metadata = LineItemMetadata::default();
        let metadata = metadata.unwrap_or(&default_metadata);
        let inserted = self
            .store
            .add_line_item(bill_id, amount, metadata, line_item_id)
            .await?;
        Ok(inserted)
    }

    /// Transition an ACTIVE line item, returning the previous row.
    ///
    /// A missing or already-voided line item surfaces as a non-retryable
    /// `NotFound` so duplicate voids terminate instead of retrying.
    pub async fn update_line_item(
        &self,
        bill_id: &str,
        line_item_id: &str,
        status: &str,
    ) -> Result<LineItemRecord, ActivityError> {
        let record = self
            .store
            .update_line_item(bill_id, line_item_id, status)
            .await?;
        Ok(record)
    }

    /// Persist the workflow's running total and flip the bill to CLOSED.
    pub async fn close_bill_from_state(&self, state: &BillState) -> Result<(), ActivityError> {
        self.store.close_bill(&state.bill_id, state.total).await?;
        Ok(())
    }

    /// Compose the response DTO for a bill, with formatted display amounts.
    pub async fn get_bill_detail(&self, bill_id: &str) -> Result<BillResponse, ActivityError> {
        let bill = self.store.get_bill(bill_id).await?;

        let mut line_items = Vec::with_capacity(bill.line_items.len());
        for item in &bill.line_items {
            let metadata = item.parse_metadata()?;
            line_items.push(LineItemResponse {
                line_item_id: item.line_item_id.clone(),
                currency: bill.currency.clone(),
                amount: item.amount,
                description: metadata.description,
                created_at: item.created_at,
                display_amount: format_amount(item.amount),
                status: item.status.clone(),
            });
        }

        Ok(BillResponse {
            bill_id: bill.bill_id,
            status: bill.status,
            policy_type: bill.policy_type,
            created_at: bill.created_at,
            closed_at: bill.closed_at,
            currency: bill.currency,
            total_amount: bill.total_amount,
            display_amount: format_amount(bill.total_amount),
            line_items,
        })
    }

    /// Render the invoice PDF for a closed bill.
    pub async fn generate_pdf_invoice(&self, bill_id: &str) -> Result<(), ActivityError> {
        // TODO: render the invoice and store it next to the bill record.
        debug!(bill_id, "generate_pdf_invoice stub");
        Ok(())
    }

    /// Create a payment link for a closed bill.
    pub async fn create_payment_link(&self, bill_id: &str) -> Result<(), ActivityError> {
        debug!(bill_id, "create_payment_link stub");
        Ok(())
    }

    /// Email the invoice for a closed bill.
    pub async fn send_bill_email(&self, bill_id: &str) -> Result<(), ActivityError> {
        debug!(bill_id, "send_bill_email stub");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_error_retryability() {
        assert!(!ActivityError::NotFound("gone".to_string()).is_retryable());
        assert!(!ActivityError::Constraint("bad input".to_string()).is_retryable());
        assert!(ActivityError::Transient("connection refused".to_string()).is_retryable());
    }

    #[test]
    fn test_activity_error_from_billing_error() {
        let err: ActivityError = BillingError::BillNotFound {
            bill_id: "b".to_string(),
        }
        .into();
        assert!(matches!(err, ActivityError::NotFound(_)));

        let err: ActivityError = BillingError::LineItemNotFound {
            bill_id: "b".to_string(),
            line_item_id: "li".to_string(),
        }
        .into();
        assert!(matches!(err, ActivityError::NotFound(_)));

        let err: ActivityError = BillingError::ValidationError {
            field: "amount".to_string(),
            message: "must be positive".to_string(),
        }
        .into();
        assert!(matches!(err, ActivityError::Constraint(_)));

        let err: ActivityError = BillingError::DatabaseError {
            operation: "insert".to_string(),
            details: "connection reset".to_string(),
        }
        .into();
        assert!(matches!(err, ActivityError::Transient(_)));
    }
}
