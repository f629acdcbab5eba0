// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for billflow-core.
//!
//! Provides a unified error type shared by the persistence layer, the
//! activity adapters, and the workflow runtime.

use std::fmt;

/// Result type using BillingError
pub type Result<T> = std::result::Result<T, BillingError>;

/// Core errors that can occur while orchestrating a bill lifecycle.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum BillingError {
    /// Bill was not found in the database.
    BillNotFound {
        /// The bill ID that was not found.
        bill_id: String,
    },

    /// No ACTIVE line item matched the given identifiers.
    LineItemNotFound {
        /// The bill the line item belongs to.
        bill_id: String,
        /// The line item ID that was not found (or no longer ACTIVE).
        line_item_id: String,
    },

    /// No running workflow execution exists for the given identifier.
    WorkflowNotFound {
        /// The workflow identifier.
        workflow_id: String,
    },

    /// A workflow execution with this identifier already exists.
    WorkflowAlreadyExists {
        /// The workflow identifier.
        workflow_id: String,
    },

    /// The workflow execution terminated with an error.
    WorkflowFailed {
        /// The workflow identifier.
        workflow_id: String,
        /// Failure details.
        details: String,
    },

    /// The requested billing policy type is not supported.
    UnsupportedPolicyType {
        /// The offending policy type string.
        policy_type: String,
    },

    /// Input validation failed.
    ValidationError {
        /// The field that failed validation.
        field: String,
        /// The validation error message.
        message: String,
    },

    /// An activity exhausted its retries or failed terminally.
    ActivityFailed {
        /// The activity name.
        activity: String,
        /// Error details.
        details: String,
    },

    /// Database operation failed.
    DatabaseError {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },
}

impl BillingError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::BillNotFound { .. } => "BILL_NOT_FOUND",
            Self::LineItemNotFound { .. } => "LINE_ITEM_NOT_FOUND",
            Self::WorkflowNotFound { .. } => "WORKFLOW_NOT_FOUND",
            Self::WorkflowAlreadyExists { .. } => "WORKFLOW_ALREADY_EXISTS",
            Self::WorkflowFailed { .. } => "WORKFLOW_FAILED",
            Self::UnsupportedPolicyType { .. } => "UNSUPPORTED_POLICY_TYPE",
            Self::ValidationError { .. } => "VALIDATION_ERROR",
            Self::ActivityFailed { .. } => "ACTIVITY_FAILED",
            Self::DatabaseError { .. } => "DATABASE_ERROR",
        }
    }

    /// True if this error denotes an absent bill, line item, or workflow.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::BillNotFound { .. }
                | Self::LineItemNotFound { .. }
                | Self::WorkflowNotFound { .. }
        )
    }
}

impl fmt::Display for BillingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BillNotFound { bill_id } => {
                write!(f, "Bill '{}' not found", bill_id)
            }
            Self::LineItemNotFound {
                bill_id,
                line_item_id,
            } => {
                write!(
                    f,
                    "No ACTIVE line item '{}' found for bill '{}'",
                    line_item_id, bill_id
                )
            }
            Self::WorkflowNotFound { workflow_id } => {
                write!(f, "Workflow '{}' not found or already completed", workflow_id)
            }
            Self::WorkflowAlreadyExists { workflow_id } => {
                write!(f, "Workflow '{}' already exists", workflow_id)
            }
            Self::WorkflowFailed {
                workflow_id,
                details,
            } => {
                write!(f, "Workflow '{}' failed: {}", workflow_id, details)
            }
            Self::UnsupportedPolicyType { policy_type } => {
                write!(f, "Unsupported policy type: {}", policy_type)
            }
            Self::ValidationError { field, message } => {
                write!(f, "Validation error for '{}': {}", field, message)
            }
            Self::ActivityFailed { activity, details } => {
                write!(f, "Activity '{}' failed: {}", activity, details)
            }
            Self::DatabaseError { operation, details } => {
                write!(f, "Database error during '{}': {}", operation, details)
            }
        }
    }
}

impl std::error::Error for BillingError {}

impl From<sqlx::Error> for BillingError {
    fn from(err: sqlx::Error) -> Self {
        BillingError::DatabaseError {
            operation: "query".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for BillingError {
    fn from(err: serde_json::Error) -> Self {
        BillingError::DatabaseError {
            operation: "json".to_string(),
            details: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let test_cases = vec![
            (
                BillingError::BillNotFound {
                    bill_id: "bill-1".to_string(),
                },
                "BILL_NOT_FOUND",
            ),
            (
                BillingError::LineItemNotFound {
                    bill_id: "bill-1".to_string(),
                    line_item_id: "li-1".to_string(),
                },
                "LINE_ITEM_NOT_FOUND",
            ),
            (
                BillingError::WorkflowNotFound {
                    workflow_id: "bill-x".to_string(),
                },
                "WORKFLOW_NOT_FOUND",
            ),
            (
                BillingError::WorkflowAlreadyExists {
                    workflow_id: "bill-x".to_string(),
                },
                "WORKFLOW_ALREADY_EXISTS",
            ),
            (
                BillingError::WorkflowFailed {
                    workflow_id: "bill-x".to_string(),
                    details: "activity exhausted retries".to_string(),
                },
                "WORKFLOW_FAILED",
            ),
            (
                BillingError::UnsupportedPolicyType {
                    policy_type: "PREPAID".to_string(),
                },
                "UNSUPPORTED_POLICY_TYPE",
            ),
            (
                BillingError::ValidationError {
                    field: "currency".to_string(),
                    message: "invalid currency".to_string(),
                },
                "VALIDATION_ERROR",
            ),
            (
                BillingError::ActivityFailed {
                    activity: "close_bill_from_state".to_string(),
                    details: "connection refused".to_string(),
                },
                "ACTIVITY_FAILED",
            ),
            (
                BillingError::DatabaseError {
                    operation: "insert".to_string(),
                    details: "connection refused".to_string(),
                },
                "DATABASE_ERROR",
            ),
        ];

        for (error, expected_code) in test_cases {
            assert_eq!(
                error.error_code(),
                expected_code,
                "Error {:?} should have code {}",
                error,
                expected_code
            );
            assert!(!error.to_string().is_empty(), "Message should not be empty");
        }
    }

    #[test]
    fn test_error_display() {
        let err = BillingError::BillNotFound {
            bill_id: "bill-42".to_string(),
        };
        assert_eq!(err.to_string(), "Bill 'bill-42' not found");

        let err = BillingError::LineItemNotFound {
            bill_id: "bill-42".to_string(),
            line_item_id: "li-7".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "No ACTIVE line item 'li-7' found for bill 'bill-42'"
        );

        let err = BillingError::WorkflowNotFound {
            workflow_id: "bill-42".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Workflow 'bill-42' not found or already completed"
        );

        let err = BillingError::ValidationError {
            field: "billing_period_end".to_string(),
            message: "must be at least 1 minute ahead".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Validation error for 'billing_period_end': must be at least 1 minute ahead"
        );
    }

    #[test]
    fn test_is_not_found() {
        assert!(BillingError::BillNotFound {
            bill_id: "x".to_string()
        }
        .is_not_found());
        assert!(BillingError::LineItemNotFound {
            bill_id: "x".to_string(),
            line_item_id: "y".to_string()
        }
        .is_not_found());
        assert!(BillingError::WorkflowNotFound {
            workflow_id: "x".to_string()
        }
        .is_not_found());
        assert!(!BillingError::DatabaseError {
            operation: "x".to_string(),
            details: "y".to_string()
        }
        .is_not_found());
    }
}
