use std::sync::Arc;

use chrono::NaiveDate;
use depot_core::{new_id, now, today, AuditEvent, AuditSink, ListResult, ServiceError};
use tracing::{debug, info, warn};

use crate::error::BatchError;
use crate::inventory::Inventory;
use crate::lifecycle;
use crate::model::{
    AddProductRequest, BatchAction, BatchListQuery, BatchOutcome, BatchProduct, BatchStatus,
    BatchView, BatchWarning, CreateBatchRequest, RmaBatch, ShippingInfo,
};
use crate::store::RmaStore;

/// Attempts at claiming a fresh batch number before giving up.
const NUMBER_ATTEMPTS: usize = 5;

/// RMA batch operations.
///
/// Guards run in [`lifecycle`]; the store applies the result with a
/// single conditional statement. Inventory moves happen only after that
/// statement commits.
pub struct RmaService {
    store: RmaStore,
    inventory: Arc<dyn Inventory>,
    audit: Arc<dyn AuditSink>,
    batch_prefix: String,
}

impl RmaService {
    pub fn new(
        store: RmaStore,
        inventory: Arc<dyn Inventory>,
        audit: Arc<dyn AuditSink>,
        batch_prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            inventory,
            audit,
            batch_prefix: batch_prefix.into(),
        }
    }

    // =======================================================================
    // Batches
    // =======================================================================

    /// Open an empty draft batch for `supplier_id`.
    pub fn create_batch(&self, req: CreateBatchRequest) -> Result<BatchView, BatchError> {
        let supplier_id = req.supplier_id.trim();
        if supplier_id.is_empty() {
            return Err(ServiceError::Validation("supplierId is required".into()).into());
        }

        let created = now();
        let mut batch = RmaBatch {
            id: new_id(),
            batch_number: String::new(),
            supplier_id: supplier_id.to_string(),
            status: BatchStatus::Draft,
            shipping_date: None,
            tracking_number: None,
            notes: req.notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            created_by: req.created_by,
            create_at: created,
            update_at: created,
            submitted_at: None,
            shipped_at: None,
            completed_at: None,
        };

        // Two creators may pick the same number; the UNIQUE index decides.
        let mut attempt = 0;
        loop {
            batch.batch_number = self.next_batch_number(created.date_naive())?;
            match self.store.create_batch(&batch) {
                Ok(()) => break,
                Err(ServiceError::Conflict(_)) if attempt + 1 < NUMBER_ATTEMPTS => {
                    debug!(number = %batch.batch_number, "batch number taken, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!(
            batch = %batch.id,
            number = %batch.batch_number,
            supplier = %batch.supplier_id,
            "rma batch created"
        );
        self.audit.record(
            AuditEvent::new("rma", "batch", &batch.id, "create").with_detail(&batch.batch_number),
        );

        Ok(BatchView {
            batch,
            products: Vec::new(),
        })
    }

    /// `{prefix}-{YYYYMMDD}-{NNNN}`, numbered per calendar day.
    fn next_batch_number(&self, day: NaiveDate) -> Result<String, ServiceError> {
        let stem = format!("{}-{}-", self.batch_prefix, day.format("%Y%m%d"));
        let next = match self.store.last_number_with_prefix(&stem)? {
            Some(last) => last[stem.len()..].parse::<u32>().map(|n| n + 1).map_err(|_| {
                ServiceError::Internal(format!("unparseable batch number {last}"))
            })?,
            None => 1,
        };
        Ok(format!("{stem}{next:04}"))
    }

    pub fn get_batch(&self, batch_id: &str) -> Result<BatchView, BatchError> {
        let batch = self.load(batch_id)?;
        let products = self.store.products(batch_id)?;
        Ok(BatchView { batch, products })
    }

    pub fn list_batches(&self, query: &BatchListQuery) -> Result<ListResult<RmaBatch>, BatchError> {
        Ok(self.store.list_batches(query)?)
    }

    pub fn list_products(&self, batch_id: &str) -> Result<Vec<BatchProduct>, BatchError> {
        self.load(batch_id)?;
        Ok(self.store.products(batch_id)?)
    }

    // =======================================================================
    // Product entries
    // =======================================================================

    /// Put a serialized unit into a draft batch.
    pub fn add_product(
        &self,
        batch_id: &str,
        req: AddProductRequest,
    ) -> Result<BatchOutcome, BatchError> {
        let serial = req.serial_number.trim();
        if serial.is_empty() {
            return Err(BatchError::validation(batch_id, "serialNumber is required"));
        }
        let batch = self.load(batch_id)?;
        lifecycle::ensure_allowed(&batch, BatchAction::AddProduct)?;

        let product = BatchProduct {
            id: new_id(),
            batch_id: batch_id.to_string(),
            serial_number: serial.to_string(),
            product_id: req.product_id.filter(|p| !p.trim().is_empty()),
            added_at: now(),
        };
        match self.store.add_product_if_draft(&product) {
            Ok(true) => {}
            Ok(false) => return Err(self.rejection(batch_id, BatchAction::AddProduct)),
            Err(ServiceError::Conflict(_)) => {
                return Err(BatchError::DuplicateSerial {
                    batch_id: batch_id.to_string(),
                    serial_number: product.serial_number,
                })
            }
            Err(e) => return Err(e.into()),
        }

        info!(batch = batch_id, serial = %product.serial_number, "product added to rma batch");
        let mut warnings = Vec::new();
        if let Err(e) = self.inventory.move_to_rma(&product.serial_number) {
            warnings.push(self.inventory_warning(batch_id, &product.serial_number, e));
        }
        self.audit.record(
            AuditEvent::new("rma", "batch", batch_id, BatchAction::AddProduct.as_str())
                .with_detail(&product.serial_number),
        );

        self.outcome(batch_id, warnings)
    }

    /// Take an entry (by entry id or serial number) out of a draft batch.
    pub fn remove_product(&self, batch_id: &str, entry: &str) -> Result<BatchOutcome, BatchError> {
        let batch = self.load(batch_id)?;
        lifecycle::ensure_allowed(&batch, BatchAction::RemoveProduct)?;

        let product = self
            .store
            .find_product(batch_id, entry)?
            .ok_or_else(|| BatchError::EntryNotFound {
                batch_id: batch_id.to_string(),
                entry: entry.to_string(),
            })?;
        if !self.store.remove_product_if_draft(batch_id, &product.id)? {
            return Err(self.rejection(batch_id, BatchAction::RemoveProduct));
        }

        info!(batch = batch_id, serial = %product.serial_number, "product removed from rma batch");
        let mut warnings = Vec::new();
        if let Err(e) = self.inventory.return_to_warehouse(&product.serial_number) {
            warnings.push(self.inventory_warning(batch_id, &product.serial_number, e));
        }
        self.audit.record(
            AuditEvent::new("rma", "batch", batch_id, BatchAction::RemoveProduct.as_str())
                .with_detail(&product.serial_number),
        );

        self.outcome(batch_id, warnings)
    }

    // =======================================================================
    // Lifecycle
    // =======================================================================

    pub fn finalize(&self, batch_id: &str, shipping: &ShippingInfo) -> Result<BatchOutcome, BatchError> {
        let count = self.store.count_products(batch_id)?;
        self.mutate(batch_id, BatchAction::Finalize, |b| {
            lifecycle::finalize(b, count, shipping, now()).map(|next| (next, Vec::new()))
        })
    }

    pub fn ship(&self, batch_id: &str, shipping: &ShippingInfo) -> Result<BatchOutcome, BatchError> {
        self.mutate(batch_id, BatchAction::Ship, |b| {
            lifecycle::ship(b, shipping, today(), now())
        })
    }

    pub fn complete(&self, batch_id: &str) -> Result<BatchOutcome, BatchError> {
        self.mutate(batch_id, BatchAction::Complete, |b| {
            lifecycle::complete(b, now()).map(|next| (next, Vec::new()))
        })
    }

    pub fn update_shipping(
        &self,
        batch_id: &str,
        shipping: &ShippingInfo,
    ) -> Result<BatchOutcome, BatchError> {
        self.mutate(batch_id, BatchAction::UpdateShipping, |b| {
            lifecycle::update_shipping(b, shipping, now()).map(|next| (next, Vec::new()))
        })
    }

    pub fn update_notes(&self, batch_id: &str, notes: Option<&str>) -> Result<BatchOutcome, BatchError> {
        self.mutate(batch_id, BatchAction::UpdateNotes, |b| {
            lifecycle::update_notes(b, notes, now()).map(|next| (next, Vec::new()))
        })
    }

    /// Load → guard → conditional write → log + audit.
    fn mutate<F>(&self, batch_id: &str, action: BatchAction, decide: F) -> Result<BatchOutcome, BatchError>
    where
        F: FnOnce(&RmaBatch) -> Result<(RmaBatch, Vec<BatchWarning>), BatchError>,
    {
        let current = self.load(batch_id)?;
        let (next, warnings) = decide(&current).inspect_err(|e| {
            debug!(batch = batch_id, action = action.as_str(), error = %e, "batch operation rejected");
        })?;

        let written = match action {
            BatchAction::Finalize => self.store.finalize_if_nonempty(&next, &current)?,
            _ => self.store.update_batch_if_current(&next, &current)?,
        };
        if !written {
            return Err(self.rejection(batch_id, action));
        }

        info!(
            batch = batch_id,
            number = %next.batch_number,
            action = action.as_str(),
            from = %current.status,
            to = %next.status,
            "rma batch updated"
        );
        if warnings.contains(&BatchWarning::MissingTrackingNumber) {
            warn!(batch = batch_id, number = %next.batch_number, "shipped without tracking number");
        }

        let mut event = AuditEvent::new("rma", "batch", batch_id, action.as_str());
        if current.status != next.status {
            event = event.with_detail(format!("{} -> {}", current.status, next.status));
        }
        self.audit.record(event);

        Ok(BatchOutcome {
            batch: next,
            products: self.store.products(batch_id)?,
            warnings,
        })
    }

    // =======================================================================
    // Helpers
    // =======================================================================

    fn load(&self, batch_id: &str) -> Result<RmaBatch, BatchError> {
        self.store
            .get_batch(batch_id)?
            .ok_or_else(|| BatchError::NotFound {
                batch_id: batch_id.to_string(),
            })
    }

    /// Explain why a guarded write matched nothing, from the stored state.
    fn rejection(&self, batch_id: &str, action: BatchAction) -> BatchError {
        let current = match self.load(batch_id) {
            Ok(b) => b,
            Err(e) => return e,
        };
        if let Err(e) = lifecycle::ensure_allowed(&current, action) {
            return e;
        }
        if action == BatchAction::Finalize {
            match self.store.count_products(batch_id) {
                Ok(0) => {
                    return BatchError::EmptyBatch {
                        batch_id: batch_id.to_string(),
                    }
                }
                Err(e) => return e.into(),
                Ok(_) => {}
            }
        }
        warn!(batch = batch_id, action = action.as_str(), status = %current.status, "concurrent batch update");
        ServiceError::InvalidState(format!(
            "batch {batch_id} changed concurrently (now {})",
            current.status
        ))
        .into()
    }

    fn inventory_warning(&self, batch_id: &str, serial: &str, err: ServiceError) -> BatchWarning {
        warn!(batch = batch_id, serial, error = %err, "inventory not updated");
        BatchWarning::InventoryNotUpdated {
            serial_number: serial.to_string(),
            message: err.to_string(),
        }
    }

    fn outcome(&self, batch_id: &str, warnings: Vec<BatchWarning>) -> Result<BatchOutcome, BatchError> {
        let BatchView { batch, products } = self.get_batch(batch_id)?;
        Ok(BatchOutcome {
            batch,
            products,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{InventoryMove, MoveKind, RecordingInventory};
    use depot_core::MemoryAudit;
    use depot_sql::SqliteStore;

    struct Fixture {
        svc: RmaService,
        inventory: Arc<RecordingInventory>,
        audit: Arc<MemoryAudit>,
    }

    fn fixture_with(inventory: RecordingInventory) -> Fixture {
        let db = Arc::new(SqliteStore::open_in_memory().unwrap());
        let inventory = Arc::new(inventory);
        let audit = Arc::new(MemoryAudit::new());
        let svc = RmaService::new(
            RmaStore::new(db).unwrap(),
            inventory.clone(),
            audit.clone(),
            "RMA",
        );
        Fixture {
            svc,
            inventory,
            audit,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(RecordingInventory::new())
    }

    fn create(svc: &RmaService) -> String {
        svc.create_batch(CreateBatchRequest {
            supplier_id: "acme".into(),
            notes: None,
            created_by: Some("clerk".into()),
        })
        .unwrap()
        .batch
        .id
    }

    fn add(svc: &RmaService, batch_id: &str, serial: &str) -> Result<BatchOutcome, BatchError> {
        svc.add_product(
            batch_id,
            AddProductRequest {
                serial_number: serial.into(),
                product_id: None,
            },
        )
    }

    fn tracking(tn: &str) -> ShippingInfo {
        ShippingInfo {
            shipping_date: None,
            tracking_number: Some(tn.into()),
        }
    }

    #[test]
    fn batch_numbers_count_up_per_day() {
        let f = fixture();
        let a = f.svc.get_batch(&create(&f.svc)).unwrap().batch.batch_number;
        let b = f.svc.get_batch(&create(&f.svc)).unwrap().batch.batch_number;

        let stem = format!("RMA-{}-", today().format("%Y%m%d"));
        assert_eq!(a, format!("{stem}0001"));
        assert_eq!(b, format!("{stem}0002"));
    }

    #[test]
    fn create_requires_supplier() {
        let f = fixture();
        let err = f
            .svc
            .create_batch(CreateBatchRequest {
                supplier_id: "  ".into(),
                notes: None,
                created_by: None,
            })
            .unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_FAILED");
    }

    #[test]
    fn full_lifecycle_scenario() {
        let f = fixture();
        let id = create(&f.svc);

        add(&f.svc, &id, "SN-1").unwrap();
        add(&f.svc, &id, "SN-2").unwrap();

        let submitted = f.svc.finalize(&id, &ShippingInfo::default()).unwrap();
        assert_eq!(submitted.batch.status, BatchStatus::Submitted);
        assert_eq!(submitted.products.len(), 2);

        let err = add(&f.svc, &id, "SN-3").unwrap_err();
        assert!(matches!(
            err,
            BatchError::InvalidState {
                status: BatchStatus::Submitted,
                action: BatchAction::AddProduct,
                ..
            }
        ));

        let shipped = f.svc.ship(&id, &tracking("1Z-42")).unwrap();
        assert_eq!(shipped.batch.status, BatchStatus::Shipped);
        assert_eq!(shipped.batch.shipping_date, Some(today()));
        assert!(shipped.warnings.is_empty());

        let err = f.svc.ship(&id, &ShippingInfo::default()).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_STATE");

        let done = f.svc.complete(&id).unwrap();
        assert_eq!(done.batch.status, BatchStatus::Completed);
        assert!(done.batch.completed_at.is_some());

        let serials: Vec<_> = done.products.iter().map(|p| p.serial_number.as_str()).collect();
        assert_eq!(serials, vec!["SN-1", "SN-2"]);

        let actions: Vec<_> = f.audit.events().into_iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec!["create", "add_product", "add_product", "finalize", "ship", "complete"]
        );
    }

    #[test]
    fn empty_batch_cannot_be_finalized() {
        let f = fixture();
        let id = create(&f.svc);
        let err = f.svc.finalize(&id, &ShippingInfo::default()).unwrap_err();
        assert_eq!(err, BatchError::EmptyBatch { batch_id: id.clone() });
        assert_eq!(f.svc.get_batch(&id).unwrap().batch.status, BatchStatus::Draft);
    }

    #[test]
    fn complete_requires_shipped() {
        let f = fixture();
        let id = create(&f.svc);
        assert_eq!(f.svc.complete(&id).unwrap_err().error_code(), "INVALID_STATE");

        add(&f.svc, &id, "SN-1").unwrap();
        f.svc.finalize(&id, &ShippingInfo::default()).unwrap();
        assert_eq!(f.svc.complete(&id).unwrap_err().error_code(), "INVALID_STATE");
    }

    #[test]
    fn duplicate_serial_rejected() {
        let f = fixture();
        let id = create(&f.svc);
        add(&f.svc, &id, "SN-1").unwrap();
        let err = add(&f.svc, &id, " SN-1 ").unwrap_err();
        assert_eq!(err.error_code(), "ALREADY_EXISTS");
        assert_eq!(f.svc.list_products(&id).unwrap().len(), 1);

        // The same unit may sit in a different batch.
        let other = create(&f.svc);
        add(&f.svc, &other, "SN-1").unwrap();
    }

    #[test]
    fn blank_serial_rejected() {
        let f = fixture();
        let id = create(&f.svc);
        assert_eq!(add(&f.svc, &id, "").unwrap_err().error_code(), "VALIDATION_FAILED");
    }

    #[test]
    fn remove_by_serial_moves_unit_back() {
        let f = fixture();
        let id = create(&f.svc);
        add(&f.svc, &id, "SN-1").unwrap();
        let entry = add(&f.svc, &id, "SN-2").unwrap().products[1].id.clone();

        let out = f.svc.remove_product(&id, "SN-1").unwrap();
        assert_eq!(out.products.len(), 1);
        f.svc.remove_product(&id, &entry).unwrap();
        assert!(f.svc.list_products(&id).unwrap().is_empty());

        let err = f.svc.remove_product(&id, "SN-9").unwrap_err();
        assert!(matches!(err, BatchError::EntryNotFound { .. }));

        assert_eq!(
            f.inventory.moves(),
            vec![
                InventoryMove { kind: MoveKind::ToRma, serial_number: "SN-1".into() },
                InventoryMove { kind: MoveKind::ToRma, serial_number: "SN-2".into() },
                InventoryMove { kind: MoveKind::ToWarehouse, serial_number: "SN-1".into() },
                InventoryMove { kind: MoveKind::ToWarehouse, serial_number: "SN-2".into() },
            ]
        );
    }

    #[test]
    fn remove_after_finalize_is_rejected() {
        let f = fixture();
        let id = create(&f.svc);
        add(&f.svc, &id, "SN-1").unwrap();
        f.svc.finalize(&id, &ShippingInfo::default()).unwrap();

        let err = f.svc.remove_product(&id, "SN-1").unwrap_err();
        assert_eq!(err.error_code(), "INVALID_STATE");
        assert_eq!(f.svc.list_products(&id).unwrap().len(), 1);
    }

    #[test]
    fn inventory_failure_is_a_warning() {
        let f = fixture_with(RecordingInventory::failing_for(&["SN-BAD"]));
        let id = create(&f.svc);
        let out = add(&f.svc, &id, "SN-BAD").unwrap();
        assert_eq!(out.products.len(), 1);
        assert!(matches!(
            out.warnings.as_slice(),
            [BatchWarning::InventoryNotUpdated { serial_number, .. }] if serial_number == "SN-BAD"
        ));
    }

    #[test]
    fn ship_without_tracking_warns() {
        let f = fixture();
        let id = create(&f.svc);
        add(&f.svc, &id, "SN-1").unwrap();
        f.svc.finalize(&id, &ShippingInfo::default()).unwrap();

        let out = f.svc.ship(&id, &ShippingInfo::default()).unwrap();
        assert_eq!(out.warnings, vec![BatchWarning::MissingTrackingNumber]);
    }

    #[test]
    fn shipping_info_from_finalize_survives_ship() {
        let f = fixture();
        let id = create(&f.svc);
        add(&f.svc, &id, "SN-1").unwrap();
        let date = NaiveDate::from_ymd_opt(2030, 1, 15).unwrap();
        f.svc
            .finalize(
                &id,
                &ShippingInfo {
                    shipping_date: Some(date),
                    tracking_number: Some("TRK-7".into()),
                },
            )
            .unwrap();

        let shipped = f.svc.ship(&id, &ShippingInfo::default()).unwrap();
        assert_eq!(shipped.batch.shipping_date, Some(date));
        assert_eq!(shipped.batch.tracking_number.as_deref(), Some("TRK-7"));
        assert!(shipped.warnings.is_empty());
    }

    #[test]
    fn shipping_and_notes_windows() {
        let f = fixture();
        let id = create(&f.svc);
        add(&f.svc, &id, "SN-1").unwrap();
        f.svc.update_shipping(&id, &tracking("EARLY")).unwrap();
        f.svc.finalize(&id, &ShippingInfo::default()).unwrap();
        f.svc.update_shipping(&id, &tracking("LATER")).unwrap();
        f.svc.ship(&id, &ShippingInfo::default()).unwrap();

        let err = f.svc.update_shipping(&id, &tracking("TOO-LATE")).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_STATE");
        assert_eq!(
            f.svc.get_batch(&id).unwrap().batch.tracking_number.as_deref(),
            Some("LATER")
        );

        f.svc.update_notes(&id, Some("box 3 of 4")).unwrap();
        f.svc.complete(&id).unwrap();
        assert!(f.svc.update_notes(&id, Some("late note")).is_err());
        assert_eq!(
            f.svc.get_batch(&id).unwrap().batch.notes.as_deref(),
            Some("box 3 of 4")
        );
    }

    #[test]
    fn unknown_batch_is_not_found() {
        let f = fixture();
        for err in [
            f.svc.get_batch("nope").unwrap_err(),
            f.svc.finalize("nope", &ShippingInfo::default()).unwrap_err(),
            add(&f.svc, "nope", "SN-1").unwrap_err(),
            f.svc.list_products("nope").unwrap_err(),
        ] {
            assert_eq!(err.error_code(), "NOT_FOUND");
        }
    }

    #[test]
    fn list_by_status() {
        let f = fixture();
        let a = create(&f.svc);
        create(&f.svc);
        add(&f.svc, &a, "SN-1").unwrap();
        f.svc.finalize(&a, &ShippingInfo::default()).unwrap();

        let drafts = f
            .svc
            .list_batches(&BatchListQuery {
                status: Some(BatchStatus::Draft),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(drafts.total, 1);
        assert_ne!(drafts.items[0].id, a);
    }
}
