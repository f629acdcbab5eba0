// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! End-to-end tests for subscription bills and the recurring timer.
//!
//! These run on the real clock with short intervals: recurring fires
//! interleave database work, which the paused test clock would skip over.

mod common;

use common::TestContext;

use std::collections::HashSet;
use std::time::Duration as StdDuration;

use chrono::Duration;

use billflow_core::runtime::deterministic_id;
use billflow_core::store::BillStore;

#[tokio::test]
async fn test_subscription_accrues_recurring_fees_until_period_end() {
    let ctx = TestContext::new().await;
    // Three full intervals fit in the billing period.
    let req = TestContext::subscription_request(
        "sub-1",
        Duration::milliseconds(700),
        500,
        "200ms",
    );
    ctx.runtime.start_bill_lifecycle(req).await.unwrap();

    let bill = ctx.runtime.await_result("sub-1").await.unwrap();
    assert_eq!(bill.status, "CLOSED");
    assert_eq!(bill.total_amount, 1500);
    assert_eq!(bill.line_items.len(), 3);
    for item in &bill.line_items {
        assert_eq!(item.amount, 500);
        assert_eq!(item.status, "ACTIVE");
        assert_eq!(item.description, "Monthly");
    }

    // Recurring line item IDs are deterministic and distinct.
    let ids: HashSet<_> = bill
        .line_items
        .iter()
        .map(|item| item.line_item_id.clone())
        .collect();
    assert_eq!(ids.len(), 3);
    for seq in 1..=3 {
        assert!(ids.contains(&deterministic_id("bill-sub-1", seq)));
    }

    assert!(ctx.runtime.post_process_started("sub-1").await);
}

#[tokio::test]
async fn test_subscription_ignores_ad_hoc_line_items() {
    let ctx = TestContext::new().await;
    let req = TestContext::subscription_request(
        "sub-adhoc",
        Duration::milliseconds(700),
        500,
        "200ms",
    );
    ctx.runtime.start_bill_lifecycle(req).await.unwrap();

    // An ad-hoc add mid-run is logged and ignored.
    tokio::time::sleep(StdDuration::from_millis(300)).await;
    ctx.add_line_item("sub-adhoc", "li-adhoc", 999).await;

    let bill = ctx.runtime.await_result("sub-adhoc").await.unwrap();
    assert_eq!(bill.total_amount, 1500);
    assert_eq!(bill.line_items.len(), 3);
    assert!(bill
        .line_items
        .iter()
        .all(|item| item.line_item_id != "li-adhoc"));
}

#[tokio::test]
async fn test_subscription_ignores_void_signals() {
    let ctx = TestContext::new().await;
    let req = TestContext::subscription_request(
        "sub-void",
        Duration::seconds(10),
        500,
        "200ms",
    );
    ctx.runtime.start_bill_lifecycle(req).await.unwrap();

    // Wait for the first recurring charge, then try to void it.
    ctx.wait_for_total("sub-void", 500).await;
    let first_item = deterministic_id("bill-sub-void", 1);
    ctx.void_line_item("sub-void", &first_item).await;
    ctx.close_bill("sub-void").await;

    let bill = ctx.runtime.await_result("sub-void").await.unwrap();
    assert_eq!(bill.total_amount, 500);
    let item = bill
        .line_items
        .iter()
        .find(|item| item.line_item_id == first_item)
        .unwrap();
    assert_eq!(item.status, "ACTIVE");
}

#[tokio::test]
async fn test_subscription_closed_early_by_signal() {
    let ctx = TestContext::new().await;
    let req = TestContext::subscription_request(
        "sub-early",
        Duration::seconds(10),
        500,
        "200ms",
    );
    ctx.runtime.start_bill_lifecycle(req).await.unwrap();

    // Two recurring charges, then an explicit close long before period end.
    ctx.wait_for_total("sub-early", 1000).await;
    ctx.close_bill("sub-early").await;

    let bill = ctx.runtime.await_result("sub-early").await.unwrap();
    assert_eq!(bill.status, "CLOSED");
    assert_eq!(bill.total_amount, 1000);
    assert_eq!(bill.line_items.len(), 2);

    let stored = ctx.store.get_bill("sub-early").await.unwrap();
    assert_eq!(stored.total_amount, 1000);

    // Recurring config survives in the bill metadata.
    let recurring = stored.recurring.expect("recurring config persisted");
    assert_eq!(recurring.amount, 500);
}
