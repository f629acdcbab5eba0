// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! API error type and its wire format.
//!
//! Every error leaves the service as JSON `{code, message}` where `code` is
//! one of `invalid_argument`, `not_found`, `internal`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use billflow_core::activities::ActivityError;
use billflow_core::BillingError;

/// Errors surfaced to HTTP callers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request was malformed or failed validation.
    #[error("{0}")]
    InvalidArgument(String),

    /// The addressed bill, line item, or workflow does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Anything the caller cannot fix.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Wire code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::NotFound(_) => "not_found",
            Self::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The canonical not-found response for bill-addressed endpoints. A
    /// finished workflow and an unknown bill are deliberately not
    /// distinguished.
    pub fn bill_not_found() -> Self {
        Self::NotFound("bill not found or already closed".to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "code": self.code(),
            "message": self.to_string(),
        }));
        (self.status(), body).into_response()
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        if err.is_not_found() {
            return Self::bill_not_found();
        }
        match err {
            BillingError::WorkflowAlreadyExists { .. } => {
                ApiError::InvalidArgument("duplicate bill id".to_string())
            }
            BillingError::ValidationError { .. } | BillingError::UnsupportedPolicyType { .. } => {
                ApiError::InvalidArgument(err.to_string())
            }
            other => {
                tracing::error!(error = %other, "request failed");
                ApiError::Internal(other.to_string())
            }
        }
    }
}

impl From<ActivityError> for ApiError {
    fn from(err: ActivityError) -> Self {
        match err {
            ActivityError::NotFound(_) => Self::bill_not_found(),
            ActivityError::Constraint(message) => ApiError::InvalidArgument(message),
            ActivityError::Transient(message) => {
                tracing::error!(error = %message, "request failed");
                ApiError::Internal(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(ApiError::InvalidArgument("x".to_string()).code(), "invalid_argument");
        assert_eq!(ApiError::NotFound("x".to_string()).code(), "not_found");
        assert_eq!(ApiError::Internal("x".to_string()).code(), "internal");
    }

    #[test]
    fn test_not_found_mapping() {
        let err: ApiError = BillingError::WorkflowNotFound {
            workflow_id: "bill-1".to_string(),
        }
        .into();
        assert_eq!(err.code(), "not_found");
        assert_eq!(err.to_string(), "bill not found or already closed");
    }

    #[test]
    fn test_duplicate_workflow_maps_to_invalid_argument() {
        let err: ApiError = BillingError::WorkflowAlreadyExists {
            workflow_id: "bill-1".to_string(),
        }
        .into();
        assert_eq!(err.code(), "invalid_argument");
        assert_eq!(err.to_string(), "duplicate bill id");
    }

    #[test]
    fn test_activity_error_mapping() {
        let err: ApiError = ActivityError::NotFound("row gone".to_string()).into();
        assert_eq!(err.code(), "not_found");

        let err: ApiError = ActivityError::Transient("db down".to_string()).into();
        assert_eq!(err.code(), "internal");
    }
}
