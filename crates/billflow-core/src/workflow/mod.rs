// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Bill lifecycle workflows: requests, signals, state, and the workflow
//! functions themselves.
//!
//! A bill is orchestrated by [`bill_lifecycle_workflow`], a signal-driven
//! state machine that accrues line items over the billing period, closes the
//! bill on an explicit signal or when the period timer fires, and kicks off
//! [`closed_bill_post_process_workflow`] as a detached child when there is
//! anything to charge.

mod lifecycle;
mod policy;
mod postprocess;
mod subscription;
mod usage_based;

pub use lifecycle::{bill_lifecycle_workflow, WorkflowOutcome};
pub use policy::BillingPolicy;
pub use postprocess::closed_bill_post_process_workflow;
pub use subscription::SubscriptionPolicy;
pub use usage_based::UsageBasedPolicy;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Currency, LineItemMetadata, LineItemStatus, PolicyType, Recurring};

/// Signal name for adding a line item to an open bill.
pub const ADD_LINE_ITEM_SIGNAL: &str = "add-line-item";
/// Signal name for updating (voiding) a line item on an open bill.
pub const UPDATE_LINE_ITEM_SIGNAL: &str = "update-line-item";
/// Signal name for closing a bill ahead of its period end.
pub const CLOSE_BILL_SIGNAL: &str = "close-bill";
/// Query name returning the live running total of an open bill.
pub const QUERY_BILL_TOTAL: &str = "GET_BILL_TOTAL";

/// Event count at which a workflow execution hands off to a fresh incarnation.
pub const CONTINUE_AS_NEW_EVENT_THRESHOLD: u32 = 500;

/// Workflow identifier for a bill's lifecycle execution.
pub fn bill_cycle_workflow_id(bill_id: &str) -> String {
    format!("bill-{}", bill_id)
}

/// Workflow identifier for a bill's post-process execution.
pub fn bill_postprocess_workflow_id(bill_id: &str) -> String {
    format!("bill-{}-postprocess", bill_id)
}

/// Task queue for lifecycle workflows, namespaced by environment.
pub fn bill_cycle_task_queue(env_name: &str) -> String {
    format!("{}bill3-lifecycle", env_name)
}

/// Task queue for post-process workflows, namespaced by environment.
pub fn closed_bill_task_queue(env_name: &str) -> String {
    format!("{}closed-bill-lifecycle", env_name)
}

/// In-workflow state. Plain serializable record so it can be handed to the
/// next incarnation through continue-as-new; never embed runtime handles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillState {
    /// The bill this execution owns.
    pub bill_id: String,
    /// Running total in minor units.
    pub total: i64,
    /// Events handled by this incarnation.
    pub event_count: u32,
}

/// Input for [`bill_lifecycle_workflow`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillLifecycleRequest {
    /// Caller-supplied unique bill identifier.
    pub bill_id: String,
    /// Billing policy for this bill.
    pub policy_type: PolicyType,
    /// Start of the billing period.
    pub billing_period_start: DateTime<Utc>,
    /// End of the billing period; the closure timer fires at this instant.
    pub billing_period_end: DateTime<Utc>,
    /// Bill currency.
    pub currency: Currency,
    /// Recurring fee configuration; required for subscription bills.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurring: Option<Recurring>,
    /// State carried over from a previous incarnation, set only by
    /// continue-as-new.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_state: Option<BillState>,
}

/// Input for [`closed_bill_post_process_workflow`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostProcessRequest {
    /// The closed bill to post-process.
    pub bill_id: String,
}

/// Payload of the `add-line-item` signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddLineItemSignal {
    /// Idempotency key for the insert, minted by the API.
    pub line_item_id: String,
    /// The target bill.
    pub bill_id: String,
    /// Charge amount in minor units.
    pub amount: i64,
    /// Optional description metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<LineItemMetadata>,
}

/// Payload of the `update-line-item` signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateLineItemSignal {
    /// The line item to transition.
    pub line_item_id: String,
    /// The target bill.
    pub bill_id: String,
    /// Target status; the only supported transition is ACTIVE to VOIDED.
    pub status: LineItemStatus,
}

/// Payload of the `close-bill` signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseBillSignal {
    /// The bill to close.
    pub bill_id: String,
}

/// A line item as presented to API callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItemResponse {
    /// Line item identifier.
    pub line_item_id: String,
    /// Bill currency code.
    pub currency: String,
    /// Charge amount in minor units.
    pub amount: i64,
    /// Human-readable description.
    pub description: String,
    /// When the line item was created.
    pub created_at: DateTime<Utc>,
    /// Amount formatted with two decimal places.
    pub display_amount: String,
    /// Line item status.
    pub status: String,
}

/// A bill as presented to API callers and returned by the workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillResponse {
    /// Bill identifier.
    pub bill_id: String,
    /// Bill status.
    pub status: String,
    /// Billing policy type.
    pub policy_type: String,
    /// When the billing period started.
    pub created_at: DateTime<Utc>,
    /// When the bill was closed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    /// Bill currency code.
    pub currency: String,
    /// Total in minor units.
    pub total_amount: i64,
    /// Total formatted with two decimal places.
    pub display_amount: String,
    /// Line items, newest first.
    pub line_items: Vec<LineItemResponse>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_identifiers() {
        assert_eq!(bill_cycle_workflow_id("abc"), "bill-abc");
        assert_eq!(bill_postprocess_workflow_id("abc"), "bill-abc-postprocess");
    }

    #[test]
    fn test_task_queue_names() {
        assert_eq!(bill_cycle_task_queue(""), "bill3-lifecycle");
        assert_eq!(bill_cycle_task_queue("staging-"), "staging-bill3-lifecycle");
        assert_eq!(closed_bill_task_queue(""), "closed-bill-lifecycle");
        assert_eq!(
            closed_bill_task_queue("staging-"),
            "staging-closed-bill-lifecycle"
        );
    }

    #[test]
    fn test_signal_name_constants() {
        assert_eq!(ADD_LINE_ITEM_SIGNAL, "add-line-item");
        assert_eq!(UPDATE_LINE_ITEM_SIGNAL, "update-line-item");
        assert_eq!(CLOSE_BILL_SIGNAL, "close-bill");
        assert_eq!(QUERY_BILL_TOTAL, "GET_BILL_TOTAL");
    }

    #[test]
    fn test_bill_state_roundtrip() {
        let state = BillState {
            bill_id: "bill-1".to_string(),
            total: 350,
            event_count: 2,
        };
        let json = serde_json::to_string(&state).unwrap();
        let parsed: BillState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.bill_id, "bill-1");
        assert_eq!(parsed.total, 350);
        assert_eq!(parsed.event_count, 2);
    }
}
