// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Usage-based billing policy: ad-hoc line items accrued over the period.

use tracing::{debug, error, warn};

use crate::activities::Activities;
use crate::error::BillingError;
use crate::runtime::{execute_activity, ActivityOptions};
use crate::store::LineItemRecord;
use crate::workflow::{AddLineItemSignal, BillState, UpdateLineItemSignal};

/// Policy for standard usage-based bills: every add/void signal is honored.
#[derive(Debug, Default)]
pub struct UsageBasedPolicy;

impl UsageBasedPolicy {
    pub(crate) async fn handle_add_line_item(
        &self,
        activities: &Activities,
        opts: &ActivityOptions,
        signal: &AddLineItemSignal,
    ) -> bool {
        let result = execute_activity(opts, "add_line_item", || {
            activities.add_line_item(
                &signal.bill_id,
                signal.amount,
                signal.metadata.as_ref(),
                &signal.line_item_id,
            )
        })
        .await;

        match result {
            Ok(true) => {
                debug!(bill_id = %signal.bill_id, line_item_id = %signal.line_item_id, "add line item activity completed");
                true
            }
            Ok(false) => {
                warn!(
                    bill_id = %signal.bill_id,
                    line_item_id = %signal.line_item_id,
                    "duplicate line item, total left unchanged"
                );
                false
            }
            Err(err) => {
                error!(error = %err, bill_id = %signal.bill_id, "failed to add line item after all retries");
                false
            }
        }
    }

    pub(crate) async fn handle_update_line_item(
        &self,
        activities: &Activities,
        opts: &ActivityOptions,
        signal: &UpdateLineItemSignal,
    ) -> Option<LineItemRecord> {
        let result = execute_activity(opts, "update_line_item", || {
            activities.update_line_item(
                &signal.bill_id,
                &signal.line_item_id,
                signal.status.as_str(),
            )
        })
        .await;

        match result {
            Ok(record) => Some(record),
            Err(err) => {
                error!(
                    error = %err,
                    bill_id = %signal.bill_id,
                    line_item_id = %signal.line_item_id,
                    "failed to update line item"
                );
                None
            }
        }
    }

    pub(crate) fn on_bill_close(&mut self, state: &BillState) -> Result<(), BillingError> {
        // State is already up to date from the signals; nothing to finalize.
        debug!(bill_id = %state.bill_id, total = state.total, "usage-based policy closing");
        Ok(())
    }

    pub(crate) fn on_timer_fired(&self, _state: &BillState) -> bool {
        // The period timer firing always closes a usage-based bill.
        true
    }
}
