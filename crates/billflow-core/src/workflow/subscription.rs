// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Subscription billing policy: a fixed fee minted on a recurring timer.

use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::activities::Activities;
use crate::error::BillingError;
use crate::runtime::{execute_activity, ActivityOptions};
use crate::types::{LineItemMetadata, Recurring};
use crate::workflow::{AddLineItemSignal, BillState, UpdateLineItemSignal};

/// Policy for subscription bills.
///
/// Ad-hoc add/void signals are rejected; instead a recurring timer mints one
/// line item of `recurring.amount` per `recurring.interval`. The timer handle
/// is a plain field because all mutation happens inside the single-threaded
/// workflow loop.
#[derive(Debug)]
pub struct SubscriptionPolicy {
    recurring: Recurring,
    next_fire: Option<Instant>,
}

impl SubscriptionPolicy {
    /// Arm the recurring timer for the first interval.
    pub fn new(recurring: Recurring) -> Self {
        let next_fire = Some(Instant::now() + recurring.interval.as_duration());
        Self {
            recurring,
            next_fire,
        }
    }

    /// Current recurring timer deadline, or None once the bill is closing.
    pub(crate) fn recurring_deadline(&self) -> Option<Instant> {
        self.next_fire
    }

    pub(crate) fn handle_add_line_item(&self, signal: &AddLineItemSignal) -> bool {
        warn!(
            bill_id = %signal.bill_id,
            line_item_id = %signal.line_item_id,
            "attempted to add a line item to a subscription bill, ignoring"
        );
        false
    }

    pub(crate) fn handle_update_line_item(&self, signal: &UpdateLineItemSignal) -> bool {
        warn!(
            bill_id = %signal.bill_id,
            line_item_id = %signal.line_item_id,
            "attempted to update a line item on a subscription bill, ignoring"
        );
        false
    }

    /// Mint the recurring line item and re-arm the timer.
    ///
    /// `line_item_id` must come from the deterministic ID facility so a
    /// replayed fire cannot double-charge. Returns the amount to add to the
    /// running total, or None if the activity failed terminally.
    pub(crate) async fn handle_recurring_item(
        &mut self,
        activities: &Activities,
        opts: &ActivityOptions,
        bill_id: &str,
        line_item_id: String,
    ) -> Option<i64> {
        self.next_fire = Some(Instant::now() + self.recurring.interval.as_duration());

        let metadata = LineItemMetadata {
            description: self.recurring.description.clone(),
        };
        let result = execute_activity(opts, "add_line_item", || {
            activities.add_line_item(bill_id, self.recurring.amount, Some(&metadata), &line_item_id)
        })
        .await;

        match result {
            Ok(true) => {
                info!(
                    bill_id,
                    line_item_id = %line_item_id,
                    amount = self.recurring.amount,
                    "recurring fee charged"
                );
                Some(self.recurring.amount)
            }
            Ok(false) => {
                warn!(bill_id, line_item_id = %line_item_id, "recurring fee already charged");
                None
            }
            Err(err) => {
                error!(error = %err, bill_id, "failed to charge recurring fee after all retries");
                None
            }
        }
    }

    pub(crate) fn on_bill_close(&mut self, state: &BillState) -> Result<(), BillingError> {
        // Release the recurring timer before the close activity runs.
        self.next_fire = None;
        info!(bill_id = %state.bill_id, total = state.total, "subscription policy closing");
        Ok(())
    }

    pub(crate) fn on_timer_fired(&self, _state: &BillState) -> bool {
        // The period timer firing always closes a subscription bill.
        true
    }
}
