// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Billflow API - HTTP surface over the bill lifecycle orchestrator.
//!
//! Thin dispatch layer: validation happens here, everything stateful happens
//! in billflow-core (the workflow runtime and the bill store).

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::{Extension, Router};

use billflow_core::activities::Activities;
use billflow_core::runtime::WorkflowRuntime;
use billflow_core::store::BillStore;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// Direct store access for reads and the duplicate-bill pre-check.
    pub store: Arc<dyn BillStore>,
    /// Activity set, used for composed reads outside a workflow.
    pub activities: Arc<Activities>,
    /// The workflow runtime hosting bill executions.
    pub runtime: Arc<WorkflowRuntime>,
}

impl AppState {
    /// Wire activities and the workflow runtime over a bill store.
    pub fn new(store: Arc<dyn BillStore>, env_name: &str) -> Self {
        let activities = Arc::new(Activities::new(store.clone()));
        let runtime = WorkflowRuntime::new(activities.clone(), env_name);
        Self {
            store,
            activities,
            runtime,
        }
    }
}

/// Build the service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/bills", post(routes::create_bill).get(routes::list_bills))
        .route("/bills/:bill_id", get(routes::get_bill))
        .route("/bills/:bill_id/close", post(routes::close_bill))
        .route("/bills/:bill_id/line-items", post(routes::add_line_item))
        .route(
            "/bills/:bill_id/line-items/:line_item_id/void",
            put(routes::void_line_item),
        )
        .layer(axum::middleware::from_fn(middleware::idempotency_key))
        .layer(Extension(state))
}
