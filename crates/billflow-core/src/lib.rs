// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Billflow Core - Durable Bill Lifecycle Orchestration
//!
//! Core is responsible for:
//! - The bill lifecycle workflow (signals, timers, continue-as-new)
//! - Billing policies (usage-based, subscription)
//! - Activities (retryable side effects over the bill store)
//! - The post-process workflow for closed bills
//! - The in-process workflow runtime hosting executions
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use billflow_core::activities::Activities;
//! use billflow_core::runtime::{Signal, WorkflowRuntime};
//! use billflow_core::store::SqliteBillStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(SqliteBillStore::from_path(".data/billflow.db").await?);
//!     let activities = Arc::new(Activities::new(store));
//!     let runtime = WorkflowRuntime::new(activities, "");
//!
//!     runtime.start_bill_lifecycle(request).await?;
//!     runtime.signal("bill-id", Signal::CloseBill(close)).await?;
//!     let bill = runtime.await_result("bill-id").await?;
//!     Ok(())
//! }
//! ```
//!
//! # Ordering and idempotency
//!
//! Within one execution, event handling is strictly serial: the selector
//! delivers one deliverable per tick and runs its handler to completion.
//! Line-item inserts are keyed by caller-minted IDs and resolve duplicate
//! delivery to a no-op; voids are an atomic status compare-and-swap, so a
//! duplicate void surfaces as a terminal `NotFound` instead of
//! double-subtracting.

pub mod activities;
pub mod error;
pub mod runtime;
pub mod store;
pub mod types;
pub mod workflow;

pub use error::{BillingError, Result};
