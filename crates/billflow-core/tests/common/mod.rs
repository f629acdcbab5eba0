// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for billflow-core integration tests.
//!
//! Provides a TestContext wiring an in-memory store, activities, and the
//! workflow runtime together.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, Utc};

use billflow_core::activities::Activities;
use billflow_core::runtime::{Signal, WorkflowRuntime};
use billflow_core::store::{BillStore, SqliteBillStore};
use billflow_core::types::{Currency, IntervalSpec, LineItemStatus, PolicyType, Recurring};
use billflow_core::workflow::{
    AddLineItemSignal, BillLifecycleRequest, CloseBillSignal, UpdateLineItemSignal,
};

/// Test context over an in-memory SQLite store.
pub struct TestContext {
    pub store: Arc<SqliteBillStore>,
    pub activities: Arc<Activities>,
    pub runtime: Arc<WorkflowRuntime>,
}

impl TestContext {
    pub async fn new() -> Self {
        let store = Arc::new(
            SqliteBillStore::in_memory()
                .await
                .expect("failed to open in-memory store"),
        );
        let activities = Arc::new(Activities::new(store.clone() as Arc<dyn BillStore>));
        let runtime = WorkflowRuntime::new(activities.clone(), "test-");
        Self {
            store,
            activities,
            runtime,
        }
    }

    /// A usage-based request whose billing period ends after `period`.
    pub fn usage_request(bill_id: &str, period: Duration) -> BillLifecycleRequest {
        let now = Utc::now();
        BillLifecycleRequest {
            bill_id: bill_id.to_string(),
            policy_type: PolicyType::UsageBased,
            billing_period_start: now,
            billing_period_end: now + period,
            currency: Currency::USD,
            recurring: None,
            previous_state: None,
        }
    }

    /// A subscription request with the given recurring fee.
    pub fn subscription_request(
        bill_id: &str,
        period: Duration,
        amount: i64,
        interval: &str,
    ) -> BillLifecycleRequest {
        let now = Utc::now();
        BillLifecycleRequest {
            bill_id: bill_id.to_string(),
            policy_type: PolicyType::Subscription,
            billing_period_start: now,
            billing_period_end: now + period,
            currency: Currency::USD,
            recurring: Some(Recurring {
                amount,
                interval: IntervalSpec::parse(interval).expect("invalid interval"),
                description: "Monthly".to_string(),
            }),
            previous_state: None,
        }
    }

    pub async fn add_line_item(&self, bill_id: &str, line_item_id: &str, amount: i64) {
        self.runtime
            .signal(
                bill_id,
                Signal::AddLineItem(AddLineItemSignal {
                    line_item_id: line_item_id.to_string(),
                    bill_id: bill_id.to_string(),
                    amount,
                    metadata: None,
                }),
            )
            .await
            .expect("failed to deliver add-line-item signal");
    }

    pub async fn void_line_item(&self, bill_id: &str, line_item_id: &str) {
        self.runtime
            .signal(
                bill_id,
                Signal::UpdateLineItem(UpdateLineItemSignal {
                    line_item_id: line_item_id.to_string(),
                    bill_id: bill_id.to_string(),
                    status: LineItemStatus::Voided,
                }),
            )
            .await
            .expect("failed to deliver update-line-item signal");
    }

    pub async fn close_bill(&self, bill_id: &str) {
        self.runtime
            .signal(
                bill_id,
                Signal::CloseBill(CloseBillSignal {
                    bill_id: bill_id.to_string(),
                }),
            )
            .await
            .expect("failed to deliver close-bill signal");
    }

    /// Poll the live total until it converges to the expected value.
    pub async fn wait_for_total(&self, bill_id: &str, expected: i64) {
        for _ in 0..200 {
            if let Ok(total) = self.runtime.query_bill_total(bill_id).await {
                if total == expected {
                    return;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("bill {} never reached total {}", bill_id, expected);
    }
}
