// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP handlers: thin dispatch onto the workflow runtime and the bill store.

use axum::extract::{Extension, Path, Query};
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use billflow_core::runtime::Signal;
use billflow_core::types::{
    format_amount, BillStatus, Currency, IntervalSpec, LineItemMetadata, LineItemStatus,
    PolicyType, Recurring,
};
use billflow_core::workflow::{
    AddLineItemSignal, BillLifecycleRequest, BillResponse, CloseBillSignal, UpdateLineItemSignal,
};

use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RecurringParams {
    pub amount: i64,
    /// Duration string, e.g. "30s" or "720h".
    #[serde(default)]
    pub interval: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateBillParams {
    #[serde(default)]
    pub bill_id: String,
    #[serde(default)]
    pub policy_type: String,
    #[serde(default)]
    pub currency: String,
    pub recurring: Option<RecurringParams>,
    pub billing_period_start: Option<DateTime<Utc>>,
    pub billing_period_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct CreateBillResponse {
    pub bill_id: String,
    pub status: String,
}

fn validate_create_bill(params: CreateBillParams) -> Result<BillLifecycleRequest, ApiError> {
    if params.bill_id.is_empty() {
        return Err(ApiError::InvalidArgument(
            "bill_id is a required field".to_string(),
        ));
    }
    let currency = Currency::parse(&params.currency)
        .map_err(|err| ApiError::InvalidArgument(err.to_string()))?;
    let policy_type = PolicyType::parse(&params.policy_type)
        .map_err(|_| ApiError::InvalidArgument("invalid policy".to_string()))?;

    let billing_period_end = params.billing_period_end.ok_or_else(|| {
        ApiError::InvalidArgument("billing_period_end is a required field".to_string())
    })?;
    if billing_period_end < Utc::now() + Duration::minutes(1) {
        return Err(ApiError::InvalidArgument(
            "billing_period_end is too short, must be at least 1 minute ahead".to_string(),
        ));
    }
    let billing_period_start = params.billing_period_start.unwrap_or_else(Utc::now);

    let recurring = match params.recurring {
        Some(recurring) => {
            let interval = IntervalSpec::parse(&recurring.interval).map_err(|err| {
                ApiError::InvalidArgument(format!("recurring.interval: {}", err))
            })?;
            Some(Recurring {
                amount: recurring.amount,
                interval,
                description: recurring.description,
            })
        }
        None => None,
    };

    if policy_type == PolicyType::Subscription {
        let recurring = recurring.as_ref().ok_or_else(|| {
            ApiError::InvalidArgument("recurring is mandatory for policy=SUBSCRIPTION".to_string())
        })?;
        if recurring.amount <= 0 {
            return Err(ApiError::InvalidArgument(
                "recurring.amount must be more than zero".to_string(),
            ));
        }
        if recurring.interval.is_zero() {
            return Err(ApiError::InvalidArgument(
                "recurring.interval must be a non-zero duration".to_string(),
            ));
        }
    }

    Ok(BillLifecycleRequest {
        bill_id: params.bill_id,
        policy_type,
        billing_period_start,
        billing_period_end,
        currency,
        recurring,
        previous_state: None,
    })
}

/// POST /bills
pub async fn create_bill(
    Extension(state): Extension<AppState>,
    Json(params): Json<CreateBillParams>,
) -> Result<Json<CreateBillResponse>, ApiError> {
    let req = validate_create_bill(params)?;

    let exists = state
        .store
        .is_bill_exists(&req.bill_id)
        .await
        .map_err(|err| {
            error!(error = %err, "failed to check bill existence");
            ApiError::from(err)
        })?;
    if exists {
        return Err(ApiError::InvalidArgument("duplicate bill id".to_string()));
    }

    let bill_id = req.bill_id.clone();
    state.runtime.start_bill_lifecycle(req).await?;

    Ok(Json(CreateBillResponse {
        bill_id,
        status: BillStatus::Open.as_str().to_string(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct AddLineItemParams {
    pub amount: i64,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct AddLineItemResponse {
    pub line_item_id: String,
    pub amount: i64,
    pub bill_id: String,
    pub description: String,
}

/// POST /bills/:bill_id/line-items
pub async fn add_line_item(
    Extension(state): Extension<AppState>,
    Path(bill_id): Path<String>,
    Json(params): Json<AddLineItemParams>,
) -> Result<Json<AddLineItemResponse>, ApiError> {
    if params.amount <= 0 {
        return Err(ApiError::InvalidArgument(
            "amount must be positive".to_string(),
        ));
    }

    // The service mints the idempotency key for the insert.
    let line_item_id = Uuid::new_v4().simple().to_string();
    let metadata = if params.description.is_empty() {
        None
    } else {
        Some(LineItemMetadata {
            description: params.description.clone(),
        })
    };

    state
        .runtime
        .signal(
            &bill_id,
            Signal::AddLineItem(AddLineItemSignal {
                line_item_id: line_item_id.clone(),
                bill_id: bill_id.clone(),
                amount: params.amount,
                metadata,
            }),
        )
        .await?;

    Ok(Json(AddLineItemResponse {
        line_item_id,
        amount: params.amount,
        bill_id,
        description: params.description,
    }))
}

#[derive(Debug, Serialize)]
pub struct VoidLineItemResponse {
    pub line_item_id: String,
    pub bill_id: String,
}

/// PUT /bills/:bill_id/line-items/:line_item_id/void
pub async fn void_line_item(
    Extension(state): Extension<AppState>,
    Path((bill_id, line_item_id)): Path<(String, String)>,
) -> Result<Json<VoidLineItemResponse>, ApiError> {
    state
        .runtime
        .signal(
            &bill_id,
            Signal::UpdateLineItem(UpdateLineItemSignal {
                line_item_id: line_item_id.clone(),
                bill_id: bill_id.clone(),
                status: LineItemStatus::Voided,
            }),
        )
        .await?;

    Ok(Json(VoidLineItemResponse {
        line_item_id,
        bill_id,
    }))
}

/// POST /bills/:bill_id/close
///
/// Signals the workflow and waits for it to complete, returning the final
/// bill.
pub async fn close_bill(
    Extension(state): Extension<AppState>,
    Path(bill_id): Path<String>,
) -> Result<Json<BillResponse>, ApiError> {
    if bill_id.is_empty() {
        return Err(ApiError::InvalidArgument("billId is mandatory".to_string()));
    }

    state
        .runtime
        .signal(
            &bill_id,
            Signal::CloseBill(CloseBillSignal {
                bill_id: bill_id.clone(),
            }),
        )
        .await?;

    let bill = state.runtime.await_result(&bill_id).await?;
    Ok(Json(bill))
}

/// GET /bills/:bill_id
pub async fn get_bill(
    Extension(state): Extension<AppState>,
    Path(bill_id): Path<String>,
) -> Result<Json<BillResponse>, ApiError> {
    let bill = state.activities.get_bill_detail(&bill_id).await?;
    Ok(Json(bill))
}

#[derive(Debug, Deserialize)]
pub struct ListBillsParams {
    #[serde(default)]
    pub status: String,
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AmountResponse {
    pub currency: String,
    pub value: i64,
    pub display_value: String,
}

#[derive(Debug, Serialize)]
pub struct BillListEntry {
    pub bill_id: String,
    pub status: String,
    pub policy_type: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    pub total_charge: AmountResponse,
}

#[derive(Debug, Serialize)]
pub struct ListBillsResponse {
    pub bills: Vec<BillListEntry>,
    pub has_more: bool,
}

/// GET /bills
///
/// Open bills report their live running total from the workflow query; a
/// query failure for one bill zeroes that entry instead of failing the
/// listing.
pub async fn list_bills(
    Extension(state): Extension<AppState>,
    Query(params): Query<ListBillsParams>,
) -> Result<Json<ListBillsResponse>, ApiError> {
    let status = BillStatus::parse(&params.status)
        .map_err(|_| ApiError::InvalidArgument("invalid status".to_string()))?;

    let limit = match params.limit {
        Some(limit) if limit > 0 => limit,
        _ => 10,
    };

    let cursor = match &params.cursor {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map_err(|_| ApiError::InvalidArgument("invalid cursor".to_string()))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    let (bills, has_more) = state.store.get_bills(status, limit, cursor).await?;

    let mut entries = Vec::with_capacity(bills.len());
    for bill in bills {
        let mut total_amount = bill.total_amount;
        let mut currency = bill.currency.clone();
        if bill.status == BillStatus::Open.as_str() {
            match state.runtime.query_bill_total(&bill.bill_id).await {
                Ok(live_total) => total_amount = live_total,
                Err(err) => {
                    error!(error = %err, bill_id = %bill.bill_id, "failed to query workflow for live total");
                    total_amount = 0;
                    currency = String::new();
                }
            }
        }

        entries.push(BillListEntry {
            bill_id: bill.bill_id,
            status: bill.status,
            policy_type: bill.policy_type,
            created_at: bill.created_at,
            closed_at: bill.closed_at,
            total_charge: AmountResponse {
                display_value: if currency.is_empty() {
                    String::new()
                } else {
                    format_amount(total_amount)
                },
                currency,
                value: total_amount,
            },
        });
    }

    Ok(Json(ListBillsResponse {
        bills: entries,
        has_more,
    }))
}
