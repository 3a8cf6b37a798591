//! Batch lifecycle guards.
//!
//! Each function checks a precondition against the current snapshot and
//! returns the next snapshot. Nothing is written here; the service
//! persists the result with a status-guarded statement.

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::BatchError;
use crate::model::{BatchAction, BatchStatus, BatchWarning, RmaBatch, ShippingInfo};

/// Fail with `InvalidState` unless `action` is legal in the batch's status.
pub fn ensure_allowed(batch: &RmaBatch, action: BatchAction) -> Result<(), BatchError> {
    if action.allowed_in().contains(&batch.status) {
        Ok(())
    } else {
        Err(BatchError::InvalidState {
            batch_id: batch.id.clone(),
            status: batch.status,
            action,
        })
    }
}

/// `draft → submitted`. Requires at least one product.
pub fn finalize(
    batch: &RmaBatch,
    product_count: usize,
    shipping: &ShippingInfo,
    at: DateTime<Utc>,
) -> Result<RmaBatch, BatchError> {
    ensure_allowed(batch, BatchAction::Finalize)?;
    if product_count == 0 {
        return Err(BatchError::EmptyBatch {
            batch_id: batch.id.clone(),
        });
    }

    let mut next = advance(batch, BatchStatus::Submitted, at);
    apply_shipping(&mut next, shipping);
    next.submitted_at = Some(at);
    Ok(next)
}

/// `submitted → shipped`.
///
/// The shipping date falls back to the one captured earlier, then to
/// `today`. A missing tracking number is reported but not rejected.
pub fn ship(
    batch: &RmaBatch,
    shipping: &ShippingInfo,
    today: NaiveDate,
    at: DateTime<Utc>,
) -> Result<(RmaBatch, Vec<BatchWarning>), BatchError> {
    ensure_allowed(batch, BatchAction::Ship)?;

    let mut next = advance(batch, BatchStatus::Shipped, at);
    apply_shipping(&mut next, shipping);
    if next.shipping_date.is_none() {
        next.shipping_date = Some(today);
    }
    next.shipped_at = Some(at);

    let mut warnings = Vec::new();
    if next.tracking_number.is_none() {
        warnings.push(BatchWarning::MissingTrackingNumber);
    }
    Ok((next, warnings))
}

/// `shipped → completed`. Terminal.
pub fn complete(batch: &RmaBatch, at: DateTime<Utc>) -> Result<RmaBatch, BatchError> {
    ensure_allowed(batch, BatchAction::Complete)?;
    let mut next = advance(batch, BatchStatus::Completed, at);
    next.completed_at = Some(at);
    Ok(next)
}

/// Change shipping details without a status change (draft or submitted).
pub fn update_shipping(
    batch: &RmaBatch,
    shipping: &ShippingInfo,
    at: DateTime<Utc>,
) -> Result<RmaBatch, BatchError> {
    ensure_allowed(batch, BatchAction::UpdateShipping)?;
    let mut next = batch.clone();
    apply_shipping(&mut next, shipping);
    next.update_at = at;
    Ok(next)
}

/// Replace (or clear) the notes of a batch that is not yet completed.
pub fn update_notes(
    batch: &RmaBatch,
    notes: Option<&str>,
    at: DateTime<Utc>,
) -> Result<RmaBatch, BatchError> {
    ensure_allowed(batch, BatchAction::UpdateNotes)?;
    let mut next = batch.clone();
    next.notes = notes.map(str::trim).filter(|n| !n.is_empty()).map(String::from);
    next.update_at = at;
    Ok(next)
}

fn advance(batch: &RmaBatch, to: BatchStatus, at: DateTime<Utc>) -> RmaBatch {
    debug_assert_eq!(batch.status.next(), Some(to), "illegal edge {} -> {to}", batch.status);
    let mut next = batch.clone();
    next.status = to;
    next.update_at = at;
    next
}

/// Provided fields overwrite; omitted ones keep their current value.
fn apply_shipping(batch: &mut RmaBatch, shipping: &ShippingInfo) {
    if let Some(date) = shipping.shipping_date {
        batch.shipping_date = Some(date);
    }
    if let Some(tn) = shipping
        .tracking_number
        .as_deref()
        .map(str::trim)
        .filter(|tn| !tn.is_empty())
    {
        batch.tracking_number = Some(tn.to_string());
    }
}
