// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The bill lifecycle workflow: a durable, signal-driven state machine.
//!
//! One execution owns one bill. The loop selects exactly one deliverable per
//! tick (a signal, a query, or a timer), runs its handler to completion, and
//! only then selects again, so state updates are strictly serial. Signals
//! within one channel arrive FIFO; cross-channel order follows delivery.

use tracing::{error, info, warn};

use crate::activities::{Activities, ActivityError};
use crate::error::BillingError;
use crate::runtime::{deterministic_id, execute_activity, ActivityOptions, WorkflowContext};
use crate::workflow::{
    BillLifecycleRequest, BillResponse, BillState, BillingPolicy, QUERY_BILL_TOTAL,
    CONTINUE_AS_NEW_EVENT_THRESHOLD,
};

/// How a single workflow incarnation ended.
#[derive(Debug)]
pub enum WorkflowOutcome {
    /// The bill was closed and persisted; this is the final result.
    Completed(BillResponse),
    /// History grew past the checkpoint threshold; the runtime must start a
    /// fresh incarnation with the embedded request.
    ContinueAsNew(Box<BillLifecycleRequest>),
}

pub(crate) fn activity_failure(activity: &str, err: ActivityError) -> BillingError {
    BillingError::ActivityFailed {
        activity: activity.to_string(),
        details: err.to_string(),
    }
}

/// Run one incarnation of the bill lifecycle.
///
/// Phase 1 creates the bill row (or restores state on a continue-as-new
/// resumption), phase 2 is the selector loop, phase 3 closes the bill,
/// fetches the final detail, and starts the detached post-process child.
pub async fn bill_lifecycle_workflow(
    ctx: &mut WorkflowContext,
    activities: &Activities,
    req: BillLifecycleRequest,
) -> Result<WorkflowOutcome, BillingError> {
    let opts = ActivityOptions::default();
    let WorkflowContext {
        workflow_id,
        add_item_rx,
        update_item_rx,
        close_rx,
        query_rx,
        clock,
        id_seq,
        runtime,
    } = ctx;

    let mut policy = BillingPolicy::for_request(&req)?;

    let mut state = match &req.previous_state {
        Some(previous) => {
            // Continued run: restore state from the previous incarnation.
            info!(
                bill_id = %req.bill_id,
                total = previous.total,
                event_count = previous.event_count,
                "continuing workflow from previous state"
            );
            previous.clone()
        }
        None => {
            // First run: create the bill row before accepting any signal.
            execute_activity(&opts, "create_bill", || activities.create_bill(&req))
                .await
                .map_err(|err| {
                    error!(error = %err, bill_id = %req.bill_id, "failed to create bill in database, failing workflow");
                    activity_failure("create_bill", err)
                })?;
            BillState {
                bill_id: req.bill_id.clone(),
                total: 0,
                event_count: 0,
            }
        }
    };

    // Timer for automatic bill closure at the end of the billing period.
    let mut timer_elapsed = false;
    let mut timer_fired = false;
    let close_timer = tokio::time::sleep_until(clock.deadline_for(req.billing_period_end));
    tokio::pin!(close_timer);

    let mut workflow_completed = false;
    while !workflow_completed {
        let recurring_deadline = policy.recurring_deadline();
        let recurring_timer = async move {
            match recurring_deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;

            // Queries read live state without disturbing the event count.
            Some(query) = query_rx.recv() => {
                match query.name.as_str() {
                    QUERY_BILL_TOTAL => {
                        let _ = query.reply.send(serde_json::json!(state.total));
                    }
                    other => {
                        warn!(workflow_id = %workflow_id, query = other, "unknown query, dropping");
                    }
                }
            }

            Some(signal) = add_item_rx.recv() => {
                state.event_count += 1;
                if policy.handle_add_line_item(activities, &opts, &signal).await {
                    state.total += signal.amount;
                }
            }

            Some(signal) = update_item_rx.recv() => {
                state.event_count += 1;
                if let Some(item) = policy.handle_update_line_item(activities, &opts, &signal).await {
                    state.total -= item.amount;
                }
            }

            Some(_signal) = close_rx.recv() => {
                // The caller's intent supersedes policy.
                info!(bill_id = %state.bill_id, "received explicit close-bill signal");
                workflow_completed = true;
            }

            _ = recurring_timer => {
                state.event_count += 1;
                *id_seq += 1;
                let line_item_id = deterministic_id(workflow_id, *id_seq);
                if let Some(amount) = policy
                    .handle_recurring_item(activities, &opts, &state.bill_id, line_item_id)
                    .await
                {
                    state.total += amount;
                }
            }

            _ = &mut close_timer, if !timer_elapsed => {
                timer_elapsed = true;
                info!(bill_id = %state.bill_id, "billing period timer fired");
                if policy.on_timer_fired(&state) {
                    timer_fired = true;
                    workflow_completed = true;
                }
            }
        }

        // Completion must win over the continue-as-new check: a closing bill
        // never hands off to a new incarnation.
        if workflow_completed {
            break;
        }

        if state.event_count >= CONTINUE_AS_NEW_EVENT_THRESHOLD {
            info!(
                bill_id = %state.bill_id,
                event_count = state.event_count,
                "event threshold reached, continuing as new"
            );
            let mut next_req = req.clone();
            next_req.previous_state = Some(BillState {
                event_count: 0,
                ..state
            });
            return Ok(WorkflowOutcome::ContinueAsNew(Box::new(next_req)));
        }
    }

    if !timer_fired {
        // Completing ahead of the period end; the pinned closure timer is
        // released when this function returns.
        info!(bill_id = %state.bill_id, "closing before billing period end");
    }

    policy.on_bill_close(&state)?;

    // Closing the bill is the contract guarantee. If it fails after retries
    // the workflow must fail so the persisted total never diverges from
    // workflow state.
    execute_activity(&opts, "close_bill_from_state", || {
        activities.close_bill_from_state(&state)
    })
    .await
    .map_err(|err| {
        error!(error = %err, bill_id = %state.bill_id, "failed to close bill, failing workflow");
        activity_failure("close_bill_from_state", err)
    })?;
    info!(bill_id = %state.bill_id, total = state.total, "bill closed");

    let bill_detail = execute_activity(&opts, "get_bill_detail", || {
        activities.get_bill_detail(&state.bill_id)
    })
    .await
    .map_err(|err| {
        error!(error = %err, bill_id = %state.bill_id, "failed to get final bill summary, failing workflow");
        activity_failure("get_bill_detail", err)
    })?;

    // Only trigger post-processing when there is something to charge. The
    // child is detached: a failure to start is critical but must not fail a
    // bill that is already closed.
    if bill_detail.total_amount > 0 {
        match runtime.upgrade() {
            Some(runtime) => match runtime.start_post_process(&state.bill_id).await {
                Ok(()) => {
                    info!(bill_id = %state.bill_id, "started post-process child workflow");
                }
                Err(err) => {
                    error!(
                        error = %err,
                        bill_id = %state.bill_id,
                        "CRITICAL: failed to start post-process child workflow, manual review required"
                    );
                }
            },
            None => {
                error!(
                    bill_id = %state.bill_id,
                    "CRITICAL: runtime dropped, cannot start post-process child workflow"
                );
            }
        }
    }

    Ok(WorkflowOutcome::Completed(bill_detail))
}
