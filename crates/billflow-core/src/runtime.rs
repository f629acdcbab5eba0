// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-process workflow runtime.
//!
//! Hosts bill lifecycle executions and provides the platform facilities the
//! workflow code relies on: per-signal FIFO channels, synchronous queries,
//! timer deadlines from a clock anchored at execution start, deterministic ID
//! minting, activity retries, continue-as-new, and detached child workflows.
//!
//! Executions run as tokio tasks, one per bill; within an execution the
//! selector loop is single-threaded and cooperative, so workflow state needs
//! no synchronization.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::activities::{Activities, ActivityError};
use crate::error::BillingError;
use crate::workflow::{
    bill_cycle_task_queue, bill_cycle_workflow_id, bill_postprocess_workflow_id,
    bill_lifecycle_workflow, closed_bill_post_process_workflow, closed_bill_task_queue,
    AddLineItemSignal, BillLifecycleRequest, BillResponse, CloseBillSignal, PostProcessRequest,
    UpdateLineItemSignal, WorkflowOutcome, ADD_LINE_ITEM_SIGNAL, CLOSE_BILL_SIGNAL,
    QUERY_BILL_TOTAL, UPDATE_LINE_ITEM_SIGNAL,
};

/// Retry configuration for activity execution.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (1 = no retries).
    pub maximum_attempts: u32,
    /// Base delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,
    /// Upper bound on the backoff delay, in milliseconds.
    pub maximum_delay_ms: u64,
}

impl RetryPolicy {
    /// Delay before the retry following the given attempt (1-indexed),
    /// exponential with the configured cap.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = 2u64.saturating_pow(attempt.saturating_sub(1));
        let delay = self
            .initial_delay_ms
            .saturating_mul(multiplier)
            .min(self.maximum_delay_ms);
        Duration::from_millis(delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            maximum_attempts: 10,
            initial_delay_ms: 1000,
            maximum_delay_ms: 60_000,
        }
    }
}

/// Options applied to every activity invocation from a workflow.
#[derive(Debug, Clone)]
pub struct ActivityOptions {
    /// Per-attempt timeout.
    pub start_to_close: Duration,
    /// Retry behavior across attempts.
    pub retry: RetryPolicy,
}

impl Default for ActivityOptions {
    fn default() -> Self {
        Self {
            start_to_close: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }
}

/// Execute an activity with at-least-once semantics.
///
/// Each attempt is bounded by `start_to_close`; a timeout counts as a
/// transient failure. Non-retryable errors (`NotFound`, `Constraint`)
/// short-circuit immediately.
pub async fn execute_activity<T, F, Fut>(
    opts: &ActivityOptions,
    activity: &str,
    mut call: F,
) -> Result<T, ActivityError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ActivityError>>,
{
    let mut attempt: u32 = 1;
    loop {
        let outcome = match tokio::time::timeout(opts.start_to_close, call()).await {
            Ok(result) => result,
            Err(_) => Err(ActivityError::Transient(format!(
                "{} timed out after {:?}",
                activity, opts.start_to_close
            ))),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) if attempt >= opts.retry.maximum_attempts => return Err(err),
            Err(err) => {
                debug!(
                    activity,
                    attempt,
                    error = %err,
                    "activity attempt failed, retrying"
                );
                tokio::time::sleep(opts.retry.delay_for_attempt(attempt)).await;
                attempt += 1;
            }
        }
    }
}

/// Mint a deterministic identifier from a workflow-scoped sequence number.
///
/// Workflow code must never reach for host randomness; the same scope and
/// sequence always yield the same ID, so a replayed recurring fire maps onto
/// the same idempotency key.
pub fn deterministic_id(scope: &str, seq: u64) -> String {
    let name = format!("{}/{}", scope, seq);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
        .simple()
        .to_string()
}

/// Clock facility handed to workflow code.
///
/// Anchored at execution start: wall-clock inputs (billing period end) are
/// translated into monotonic deadlines relative to the anchor, which keeps
/// timer behavior deterministic under tokio's paused test clock.
#[derive(Debug, Clone)]
pub struct WorkflowClock {
    wall_anchor: DateTime<Utc>,
    instant_anchor: Instant,
}

impl WorkflowClock {
    /// Anchor a clock at the current wall time.
    pub fn start() -> Self {
        Self {
            wall_anchor: Utc::now(),
            instant_anchor: Instant::now(),
        }
    }

    /// Current workflow time.
    pub fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.instant_anchor.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.wall_anchor + elapsed
    }

    /// Monotonic deadline for a wall-clock instant. Instants in the past
    /// resolve to the anchor, so the timer fires immediately.
    pub fn deadline_for(&self, at: DateTime<Utc>) -> Instant {
        match (at - self.wall_anchor).to_std() {
            Ok(delta) => self.instant_anchor + delta,
            Err(_) => self.instant_anchor,
        }
    }
}

/// A synchronous read of workflow state, served by the selector loop.
#[derive(Debug)]
pub struct QueryRequest {
    /// Query name; unknown names are dropped.
    pub name: String,
    /// Reply channel; dropped without an answer on unknown queries.
    pub reply: oneshot::Sender<serde_json::Value>,
}

/// Per-execution facilities owned by the workflow task.
///
/// Survives continue-as-new: the next incarnation reuses the same channels,
/// so signals buffered during the handoff are not lost, and the ID sequence
/// keeps advancing so incarnations never mint colliding IDs.
pub struct WorkflowContext {
    pub(crate) workflow_id: String,
    pub(crate) add_item_rx: mpsc::UnboundedReceiver<AddLineItemSignal>,
    pub(crate) update_item_rx: mpsc::UnboundedReceiver<UpdateLineItemSignal>,
    pub(crate) close_rx: mpsc::UnboundedReceiver<CloseBillSignal>,
    pub(crate) query_rx: mpsc::UnboundedReceiver<QueryRequest>,
    pub(crate) clock: WorkflowClock,
    pub(crate) id_seq: u64,
    pub(crate) runtime: Weak<WorkflowRuntime>,
}

impl WorkflowContext {
    /// The identifier of the execution this context belongs to.
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }
}

/// A signal addressed to a running bill lifecycle execution.
#[derive(Debug, Clone)]
pub enum Signal {
    /// Add a line item to the bill.
    AddLineItem(AddLineItemSignal),
    /// Transition a line item (void).
    UpdateLineItem(UpdateLineItemSignal),
    /// Close the bill ahead of its period end.
    CloseBill(CloseBillSignal),
}

impl Signal {
    /// The wire name of this signal.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddLineItem(_) => ADD_LINE_ITEM_SIGNAL,
            Self::UpdateLineItem(_) => UPDATE_LINE_ITEM_SIGNAL,
            Self::CloseBill(_) => CLOSE_BILL_SIGNAL,
        }
    }
}

type ExecutionResult = Result<BillResponse, String>;

struct ExecutionEntry {
    add_item_tx: mpsc::UnboundedSender<AddLineItemSignal>,
    update_item_tx: mpsc::UnboundedSender<UpdateLineItemSignal>,
    close_tx: mpsc::UnboundedSender<CloseBillSignal>,
    query_tx: mpsc::UnboundedSender<QueryRequest>,
    result_rx: watch::Receiver<Option<ExecutionResult>>,
    incarnations: Arc<AtomicU32>,
}

/// Hosts workflow executions and routes signals, queries, and results.
pub struct WorkflowRuntime {
    activities: Arc<Activities>,
    lifecycle_queue: String,
    post_process_queue: String,
    executions: Mutex<HashMap<String, ExecutionEntry>>,
    children: Mutex<HashMap<String, watch::Receiver<Option<Result<(), String>>>>>,
}

impl WorkflowRuntime {
    /// Create a runtime over the given activities, namespacing its task
    /// queues with the environment name.
    pub fn new(activities: Arc<Activities>, env_name: &str) -> Arc<Self> {
        Arc::new(Self {
            activities,
            lifecycle_queue: bill_cycle_task_queue(env_name),
            post_process_queue: closed_bill_task_queue(env_name),
            executions: Mutex::new(HashMap::new()),
            children: Mutex::new(HashMap::new()),
        })
    }

    /// Start a bill lifecycle execution with identifier `bill-<BillID>`.
    ///
    /// Fails if an execution with that identifier already exists, running or
    /// finished: a bill ID maps to at most one execution.
    pub async fn start_bill_lifecycle(
        self: &Arc<Self>,
        req: BillLifecycleRequest,
    ) -> Result<(), BillingError> {
        let workflow_id = bill_cycle_workflow_id(&req.bill_id);
        let mut executions = self.executions.lock().await;
        if executions.contains_key(&workflow_id) {
            return Err(BillingError::WorkflowAlreadyExists { workflow_id });
        }

        let (add_item_tx, add_item_rx) = mpsc::unbounded_channel();
        let (update_item_tx, update_item_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = mpsc::unbounded_channel();
        let (query_tx, query_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = watch::channel(None);
        let incarnations = Arc::new(AtomicU32::new(0));

        executions.insert(
            workflow_id.clone(),
            ExecutionEntry {
                add_item_tx,
                update_item_tx,
                close_tx,
                query_tx,
                result_rx,
                incarnations: incarnations.clone(),
            },
        );
        drop(executions);

        info!(
            workflow_id = %workflow_id,
            task_queue = %self.lifecycle_queue,
            policy_type = %req.policy_type,
            "starting bill lifecycle workflow"
        );

        let mut ctx = WorkflowContext {
            workflow_id: workflow_id.clone(),
            add_item_rx,
            update_item_rx,
            close_rx,
            query_rx,
            clock: WorkflowClock::start(),
            id_seq: 0,
            runtime: Arc::downgrade(self),
        };
        let activities = self.activities.clone();

        tokio::spawn(async move {
            let mut request = req;
            let result = loop {
                match bill_lifecycle_workflow(&mut ctx, &activities, request).await {
                    Ok(WorkflowOutcome::ContinueAsNew(next)) => {
                        incarnations.fetch_add(1, Ordering::SeqCst);
                        request = *next;
                    }
                    Ok(WorkflowOutcome::Completed(response)) => break Ok(response),
                    Err(err) => {
                        error!(error = %err, workflow_id = %ctx.workflow_id, "bill lifecycle workflow failed");
                        break Err(err.to_string());
                    }
                }
            };
            let _ = result_tx.send(Some(result));
        });

        Ok(())
    }

    /// Deliver a signal to a running execution.
    ///
    /// A finished or absent execution yields `WorkflowNotFound`, which the
    /// API surfaces as "bill not found or already closed".
    pub async fn signal(&self, bill_id: &str, signal: Signal) -> Result<(), BillingError> {
        let workflow_id = bill_cycle_workflow_id(bill_id);
        let executions = self.executions.lock().await;
        let entry =
            executions
                .get(&workflow_id)
                .ok_or_else(|| BillingError::WorkflowNotFound {
                    workflow_id: workflow_id.clone(),
                })?;
        if entry.result_rx.borrow().is_some() {
            return Err(BillingError::WorkflowNotFound { workflow_id });
        }

        debug!(workflow_id = %workflow_id, signal = signal.name(), "delivering signal");
        let delivered = match signal {
            Signal::AddLineItem(payload) => entry.add_item_tx.send(payload).is_ok(),
            Signal::UpdateLineItem(payload) => entry.update_item_tx.send(payload).is_ok(),
            Signal::CloseBill(payload) => entry.close_tx.send(payload).is_ok(),
        };
        if !delivered {
            return Err(BillingError::WorkflowNotFound { workflow_id });
        }
        Ok(())
    }

    /// Run the `GET_BILL_TOTAL` query against a running execution.
    pub async fn query_bill_total(&self, bill_id: &str) -> Result<i64, BillingError> {
        let workflow_id = bill_cycle_workflow_id(bill_id);
        let query_tx = {
            let executions = self.executions.lock().await;
            let entry =
                executions
                    .get(&workflow_id)
                    .ok_or_else(|| BillingError::WorkflowNotFound {
                        workflow_id: workflow_id.clone(),
                    })?;
            if entry.result_rx.borrow().is_some() {
                return Err(BillingError::WorkflowNotFound { workflow_id });
            }
            entry.query_tx.clone()
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        query_tx
            .send(QueryRequest {
                name: QUERY_BILL_TOTAL.to_string(),
                reply: reply_tx,
            })
            .map_err(|_| BillingError::WorkflowNotFound {
                workflow_id: workflow_id.clone(),
            })?;

        let value = reply_rx
            .await
            .map_err(|_| BillingError::WorkflowNotFound { workflow_id })?;
        Ok(serde_json::from_value(value)?)
    }

    /// Wait for an execution to finish and return its result.
    pub async fn await_result(&self, bill_id: &str) -> Result<BillResponse, BillingError> {
        let workflow_id = bill_cycle_workflow_id(bill_id);
        let mut result_rx = {
            let executions = self.executions.lock().await;
            executions
                .get(&workflow_id)
                .ok_or_else(|| BillingError::WorkflowNotFound {
                    workflow_id: workflow_id.clone(),
                })?
                .result_rx
                .clone()
        };

        let outcome = result_rx
            .wait_for(|value| value.is_some())
            .await
            .map_err(|_| BillingError::WorkflowFailed {
                workflow_id: workflow_id.clone(),
                details: "workflow terminated without a result".to_string(),
            })?;

        match outcome.as_ref() {
            Some(Ok(response)) => Ok(response.clone()),
            Some(Err(details)) => Err(BillingError::WorkflowFailed {
                workflow_id,
                details: details.clone(),
            }),
            None => Err(BillingError::WorkflowFailed {
                workflow_id,
                details: "workflow result missing".to_string(),
            }),
        }
    }

    /// Start the post-process child workflow for a closed bill.
    ///
    /// Detached from the parent (ABANDON): the parent never awaits it, and at
    /// most one child per bill is ever started.
    pub async fn start_post_process(self: &Arc<Self>, bill_id: &str) -> Result<(), BillingError> {
        let workflow_id = bill_postprocess_workflow_id(bill_id);
        let mut children = self.children.lock().await;
        if children.contains_key(&workflow_id) {
            return Err(BillingError::WorkflowAlreadyExists { workflow_id });
        }

        let (result_tx, result_rx) = watch::channel(None);
        children.insert(workflow_id.clone(), result_rx);
        drop(children);

        info!(
            workflow_id = %workflow_id,
            task_queue = %self.post_process_queue,
            "starting post-process child workflow"
        );

        let activities = self.activities.clone();
        let request = PostProcessRequest {
            bill_id: bill_id.to_string(),
        };
        tokio::spawn(async move {
            let result = closed_bill_post_process_workflow(&activities, &request)
                .await
                .map_err(|err| err.to_string());
            let _ = result_tx.send(Some(result));
        });

        Ok(())
    }

    /// True if a lifecycle execution exists and has not finished.
    pub async fn is_running(&self, bill_id: &str) -> bool {
        let workflow_id = bill_cycle_workflow_id(bill_id);
        let executions = self.executions.lock().await;
        executions
            .get(&workflow_id)
            .map(|entry| entry.result_rx.borrow().is_none())
            .unwrap_or(false)
    }

    /// Number of continue-as-new handoffs the execution has performed.
    pub async fn incarnations(&self, bill_id: &str) -> Option<u32> {
        let workflow_id = bill_cycle_workflow_id(bill_id);
        let executions = self.executions.lock().await;
        executions
            .get(&workflow_id)
            .map(|entry| entry.incarnations.load(Ordering::SeqCst))
    }

    /// True if a post-process child was started for this bill.
    pub async fn post_process_started(&self, bill_id: &str) -> bool {
        let workflow_id = bill_postprocess_workflow_id(bill_id);
        self.children.lock().await.contains_key(&workflow_id)
    }

    /// Wait for the post-process child of a bill, if one was started.
    pub async fn await_post_process(&self, bill_id: &str) -> Option<Result<(), String>> {
        let workflow_id = bill_postprocess_workflow_id(bill_id);
        let mut result_rx = {
            let children = self.children.lock().await;
            children.get(&workflow_id)?.clone()
        };
        let outcome = result_rx.wait_for(|value| value.is_some()).await.ok()?;
        outcome.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn test_deterministic_id_is_stable() {
        let a = deterministic_id("bill-2", 1);
        let b = deterministic_id("bill-2", 1);
        assert_eq!(a, b);

        let c = deterministic_id("bill-2", 2);
        assert_ne!(a, c);

        let d = deterministic_id("bill-3", 1);
        assert_ne!(a, d);

        // Simple format: 32 hex chars, no dashes.
        assert_eq!(a.len(), 32);
        assert!(!a.contains('-'));
    }

    #[test]
    fn test_retry_policy_delays() {
        let policy = RetryPolicy {
            maximum_attempts: 10,
            initial_delay_ms: 100,
            maximum_delay_ms: 1000,
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
        // Capped by maximum_delay_ms.
        assert_eq!(policy.delay_for_attempt(8), Duration::from_millis(1000));
    }

    #[test]
    fn test_activity_options_default() {
        let opts = ActivityOptions::default();
        assert_eq!(opts.start_to_close, Duration::from_secs(60));
        assert_eq!(opts.retry.maximum_attempts, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_activity_retries_transient_errors() {
        let attempts = AtomicU32::new(0);
        let result = execute_activity(&ActivityOptions::default(), "flaky", || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if attempt < 3 {
                    Err(ActivityError::Transient("connection reset".to_string()))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_activity_does_not_retry_not_found() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), ActivityError> =
            execute_activity(&ActivityOptions::default(), "missing", || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(ActivityError::NotFound("gone".to_string())) }
            })
            .await;

        assert!(matches!(result, Err(ActivityError::NotFound(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_activity_exhausts_attempts() {
        let opts = ActivityOptions {
            start_to_close: Duration::from_secs(60),
            retry: RetryPolicy {
                maximum_attempts: 4,
                initial_delay_ms: 10,
                maximum_delay_ms: 100,
            },
        };
        let attempts = AtomicU32::new(0);
        let result: Result<(), ActivityError> = execute_activity(&opts, "down", || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(ActivityError::Transient("connection refused".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(ActivityError::Transient(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_activity_times_out_slow_attempts() {
        let opts = ActivityOptions {
            start_to_close: Duration::from_millis(50),
            retry: RetryPolicy {
                maximum_attempts: 2,
                initial_delay_ms: 10,
                maximum_delay_ms: 100,
            },
        };
        let result: Result<(), ActivityError> = execute_activity(&opts, "stuck", || async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(ActivityError::Transient(_))));
    }

    #[test]
    fn test_workflow_clock_deadlines() {
        let clock = WorkflowClock::start();
        let future = clock.wall_anchor + chrono::Duration::seconds(90);
        let deadline = clock.deadline_for(future);
        assert_eq!(deadline - clock.instant_anchor, Duration::from_secs(90));

        // Past instants resolve to the anchor.
        let past = clock.wall_anchor - chrono::Duration::seconds(5);
        assert_eq!(clock.deadline_for(past), clock.instant_anchor);
    }

    #[test]
    fn test_signal_names() {
        let signal = Signal::CloseBill(CloseBillSignal {
            bill_id: "b".to_string(),
        });
        assert_eq!(signal.name(), "close-bill");
    }
}
