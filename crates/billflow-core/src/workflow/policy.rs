// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Billing policy dispatch.
//!
//! Policies encapsulate per-bill-kind behavior so the workflow loop stays
//! stable while business rules vary. Represented as a tagged variant rather
//! than a trait object: the subscription variant owns a mutable timer
//! deadline, and enum dispatch keeps that mutation plain.

use tokio::time::Instant;

use crate::activities::Activities;
use crate::error::BillingError;
use crate::runtime::ActivityOptions;
use crate::store::LineItemRecord;
use crate::types::PolicyType;
use crate::workflow::{
    AddLineItemSignal, BillLifecycleRequest, BillState, SubscriptionPolicy, UpdateLineItemSignal,
    UsageBasedPolicy,
};

/// Per-bill billing behavior, selected by [`PolicyType`].
#[derive(Debug)]
pub enum BillingPolicy {
    /// Ad-hoc line items accrued over the billing period.
    UsageBased(UsageBasedPolicy),
    /// Fixed recurring fee minted on an interval.
    Subscription(SubscriptionPolicy),
}

impl BillingPolicy {
    /// Construct the policy for a workflow request.
    ///
    /// Subscription requests must carry a recurring configuration with a
    /// positive amount and a non-zero interval.
    pub fn for_request(req: &BillLifecycleRequest) -> Result<Self, BillingError> {
        match req.policy_type {
            PolicyType::UsageBased => Ok(Self::UsageBased(UsageBasedPolicy)),
            PolicyType::Subscription => {
                let recurring =
                    req.recurring
                        .clone()
                        .ok_or_else(|| BillingError::ValidationError {
                            field: "recurring".to_string(),
                            message: "recurring is mandatory for policy=SUBSCRIPTION".to_string(),
                        })?;
                if recurring.amount <= 0 {
                    return Err(BillingError::ValidationError {
                        field: "recurring.amount".to_string(),
                        message: "must be more than zero".to_string(),
                    });
                }
                if recurring.interval.is_zero() {
                    return Err(BillingError::ValidationError {
                        field: "recurring.interval".to_string(),
                        message: "must be a non-zero duration".to_string(),
                    });
                }
                Ok(Self::Subscription(SubscriptionPolicy::new(recurring)))
            }
        }
    }

    /// Handle an `add-line-item` signal.
    ///
    /// Returns true if the workflow should add the signal amount to the
    /// running total.
    pub async fn handle_add_line_item(
        &self,
        activities: &Activities,
        opts: &ActivityOptions,
        signal: &AddLineItemSignal,
    ) -> bool {
        match self {
            Self::UsageBased(policy) => {
                policy
                    .handle_add_line_item(activities, opts, signal)
                    .await
            }
            Self::Subscription(policy) => policy.handle_add_line_item(signal),
        }
    }

    /// Handle an `update-line-item` signal.
    ///
    /// Returns the voided line item (carrying its amount) to drive a negative
    /// delta on the running total, or None if the signal was rejected.
    pub async fn handle_update_line_item(
        &self,
        activities: &Activities,
        opts: &ActivityOptions,
        signal: &UpdateLineItemSignal,
    ) -> Option<LineItemRecord> {
        match self {
            Self::UsageBased(policy) => {
                policy
                    .handle_update_line_item(activities, opts, signal)
                    .await
            }
            Self::Subscription(policy) => {
                policy.handle_update_line_item(signal);
                None
            }
        }
    }

    /// Current recurring timer deadline, if this policy runs one.
    pub fn recurring_deadline(&self) -> Option<Instant> {
        match self {
            Self::UsageBased(_) => None,
            Self::Subscription(policy) => policy.recurring_deadline(),
        }
    }

    /// Handle a recurring timer fire. Returns the amount to add to the
    /// running total on success.
    pub async fn handle_recurring_item(
        &mut self,
        activities: &Activities,
        opts: &ActivityOptions,
        bill_id: &str,
        line_item_id: String,
    ) -> Option<i64> {
        match self {
            Self::UsageBased(_) => None,
            Self::Subscription(policy) => {
                policy
                    .handle_recurring_item(activities, opts, bill_id, line_item_id)
                    .await
            }
        }
    }

    /// Final hook before the bill is persisted as closed.
    pub fn on_bill_close(&mut self, state: &BillState) -> Result<(), BillingError> {
        match self {
            Self::UsageBased(policy) => policy.on_bill_close(state),
            Self::Subscription(policy) => policy.on_bill_close(state),
        }
    }

    /// Decide whether the period timer firing completes the workflow.
    pub fn on_timer_fired(&self, state: &BillState) -> bool {
        match self {
            Self::UsageBased(policy) => policy.on_timer_fired(state),
            Self::Subscription(policy) => policy.on_timer_fired(state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Currency, IntervalSpec, Recurring};
    use chrono::{Duration, Utc};

    fn request(policy_type: PolicyType, recurring: Option<Recurring>) -> BillLifecycleRequest {
        BillLifecycleRequest {
            bill_id: "bill-1".to_string(),
            policy_type,
            billing_period_start: Utc::now(),
            billing_period_end: Utc::now() + Duration::minutes(5),
            currency: Currency::USD,
            recurring,
            previous_state: None,
        }
    }

    #[tokio::test]
    async fn test_usage_based_policy_has_no_recurring_timer() {
        let policy = BillingPolicy::for_request(&request(PolicyType::UsageBased, None)).unwrap();
        assert!(policy.recurring_deadline().is_none());
    }

    #[tokio::test]
    async fn test_subscription_requires_recurring() {
        let err = BillingPolicy::for_request(&request(PolicyType::Subscription, None)).unwrap_err();
        assert!(matches!(err, BillingError::ValidationError { .. }));
    }

    #[tokio::test]
    async fn test_subscription_rejects_non_positive_amount() {
        let recurring = Recurring {
            amount: 0,
            interval: IntervalSpec::parse("30s").unwrap(),
            description: String::new(),
        };
        let err = BillingPolicy::for_request(&request(PolicyType::Subscription, Some(recurring)))
            .unwrap_err();
        assert!(matches!(err, BillingError::ValidationError { .. }));
    }

    #[tokio::test]
    async fn test_subscription_rejects_zero_interval() {
        let recurring = Recurring {
            amount: 500,
            interval: IntervalSpec(std::time::Duration::ZERO),
            description: String::new(),
        };
        let err = BillingPolicy::for_request(&request(PolicyType::Subscription, Some(recurring)))
            .unwrap_err();
        assert!(matches!(err, BillingError::ValidationError { .. }));
    }

    #[tokio::test]
    async fn test_subscription_arms_recurring_timer() {
        let recurring = Recurring {
            amount: 500,
            interval: IntervalSpec::parse("30s").unwrap(),
            description: "Monthly".to_string(),
        };
        let mut policy =
            BillingPolicy::for_request(&request(PolicyType::Subscription, Some(recurring)))
                .unwrap();
        assert!(policy.recurring_deadline().is_some());

        let state = BillState {
            bill_id: "bill-1".to_string(),
            total: 0,
            event_count: 0,
        };
        policy.on_bill_close(&state).unwrap();
        assert!(policy.recurring_deadline().is_none());
    }

    #[tokio::test]
    async fn test_timer_fired_closes_both_policies() {
        let state = BillState {
            bill_id: "bill-1".to_string(),
            total: 0,
            event_count: 0,
        };
        let policy = BillingPolicy::for_request(&request(PolicyType::UsageBased, None)).unwrap();
        assert!(policy.on_timer_fired(&state));

        let recurring = Recurring {
            amount: 500,
            interval: IntervalSpec::parse("30s").unwrap(),
            description: String::new(),
        };
        let policy =
            BillingPolicy::for_request(&request(PolicyType::Subscription, Some(recurring)))
                .unwrap();
        assert!(policy.on_timer_fired(&state));
    }
}
