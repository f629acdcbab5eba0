// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Post-process workflow for closed bills.
//!
//! Runs detached from the lifecycle workflow (parent-close policy ABANDON),
//! so operational replays of a failed stage happen here without touching the
//! already-closed bill.

use tracing::{error, info};

use crate::activities::Activities;
use crate::error::BillingError;
use crate::runtime::{execute_activity, ActivityOptions};
use crate::workflow::lifecycle::activity_failure;
use crate::workflow::PostProcessRequest;

/// Sequential finalize pipeline: fetch detail, render the PDF invoice,
/// create a payment link, send the bill email. Each stage retries per the
/// activity policy; any stage failing terminally fails this workflow.
pub async fn closed_bill_post_process_workflow(
    activities: &Activities,
    req: &PostProcessRequest,
) -> Result<(), BillingError> {
    let opts = ActivityOptions::default();

    let bill_detail = execute_activity(&opts, "get_bill_detail", || {
        activities.get_bill_detail(&req.bill_id)
    })
    .await
    .map_err(|err| {
        error!(error = %err, bill_id = %req.bill_id, "failed to get final bill summary, failing workflow");
        activity_failure("get_bill_detail", err)
    })?;

    execute_activity(&opts, "generate_pdf_invoice", || {
        activities.generate_pdf_invoice(&req.bill_id)
    })
    .await
    .map_err(|err| {
        error!(error = %err, bill_id = %req.bill_id, "failed to generate pdf invoice");
        activity_failure("generate_pdf_invoice", err)
    })?;

    execute_activity(&opts, "create_payment_link", || {
        activities.create_payment_link(&req.bill_id)
    })
    .await
    .map_err(|err| {
        error!(error = %err, bill_id = %req.bill_id, "failed to create payment link");
        activity_failure("create_payment_link", err)
    })?;

    execute_activity(&opts, "send_bill_email", || {
        activities.send_bill_email(&req.bill_id)
    })
    .await
    .map_err(|err| {
        error!(error = %err, bill_id = %req.bill_id, "failed to send email");
        activity_failure("send_bill_email", err)
    })?;

    info!(
        bill_id = %req.bill_id,
        total_amount = bill_detail.total_amount,
        "bill post-process workflow completed"
    );

    Ok(())
}
