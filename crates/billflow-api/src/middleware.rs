// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Idempotency-key middleware.
//!
//! Mutating endpoints accept `X-Idempotency-Key`. Workflow correctness does
//! not depend on it (line-item inserts carry their own idempotency keys);
//! the header exists so an external response cache can short-circuit client
//! retries. This middleware records the key and forwards the request; the
//! cache lookup/lock/store steps belong to that external layer.

use axum::http::{Method, Request};
use axum::middleware::Next;
use axum::response::Response;
use tracing::debug;

/// Record the idempotency key of mutating requests.
pub async fn idempotency_key<B>(request: Request<B>, next: Next<B>) -> Response {
    if request.method() != Method::GET {
        if let Some(key) = request
            .headers()
            .get("x-idempotency-key")
            .and_then(|value| value.to_str().ok())
        {
            debug!(
                idempotency_key = %key,
                method = %request.method(),
                path = %request.uri().path(),
                "mutating request carries idempotency key"
            );
        }
    }
    next.run(request).await
}
