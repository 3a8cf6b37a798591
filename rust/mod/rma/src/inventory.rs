use std::sync::Mutex;

use depot_core::ServiceError;
use serde::Serialize;
use tracing::info;

/// Location bookkeeping for serialized units.
///
/// Called only after the batch change has committed. A failure here is
/// surfaced as a warning on the batch operation, never rolled back.
pub trait Inventory: Send + Sync {
    /// The unit left the warehouse and is held for return.
    fn move_to_rma(&self, serial_number: &str) -> Result<(), ServiceError>;

    /// The unit was pulled out of a draft batch and is back on the shelf.
    fn return_to_warehouse(&self, serial_number: &str) -> Result<(), ServiceError>;
}

/// Records intent in the log only. Used when no inventory backend is wired.
#[derive(Debug, Default)]
pub struct LoggingInventory;

impl Inventory for LoggingInventory {
    fn move_to_rma(&self, serial_number: &str) -> Result<(), ServiceError> {
        info!(target: "inventory", serial = serial_number, "move to RMA location");
        Ok(())
    }

    fn return_to_warehouse(&self, serial_number: &str) -> Result<(), ServiceError> {
        info!(target: "inventory", serial = serial_number, "return to warehouse");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveKind {
    ToRma,
    ToWarehouse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryMove {
    pub kind: MoveKind,
    pub serial_number: String,
}

/// Keeps every requested move in memory. Serials listed in `failing`
/// are rejected, which lets callers exercise the warning path.
#[derive(Debug, Default)]
pub struct RecordingInventory {
    moves: Mutex<Vec<InventoryMove>>,
    failing: Vec<String>,
}

impl RecordingInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(serials: &[&str]) -> Self {
        Self {
            moves: Mutex::default(),
            failing: serials.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn moves(&self) -> Vec<InventoryMove> {
        self.moves.lock().map(|m| m.clone()).unwrap_or_default()
    }

    fn push(&self, kind: MoveKind, serial_number: &str) -> Result<(), ServiceError> {
        if self.failing.iter().any(|s| s == serial_number) {
            return Err(ServiceError::Internal(format!(
                "inventory rejected {serial_number}"
            )));
        }
        let mut moves = self
            .moves
            .lock()
            .map_err(|_| ServiceError::Internal("inventory log poisoned".into()))?;
        moves.push(InventoryMove {
            kind,
            serial_number: serial_number.to_string(),
        });
        Ok(())
    }
}

impl Inventory for RecordingInventory {
    fn move_to_rma(&self, serial_number: &str) -> Result<(), ServiceError> {
        self.push(MoveKind::ToRma, serial_number)
    }

    fn return_to_warehouse(&self, serial_number: &str) -> Result<(), ServiceError> {
        self.push(MoveKind::ToWarehouse, serial_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_keeps_order() {
        let inv = RecordingInventory::new();
        inv.move_to_rma("SN-1").unwrap();
        inv.return_to_warehouse("SN-1").unwrap();
        assert_eq!(
            inv.moves(),
            vec![
                InventoryMove {
                    kind: MoveKind::ToRma,
                    serial_number: "SN-1".into()
                },
                InventoryMove {
                    kind: MoveKind::ToWarehouse,
                    serial_number: "SN-1".into()
                },
            ]
        );
    }

    #[test]
    fn failing_serials_are_not_recorded() {
        let inv = RecordingInventory::failing_for(&["SN-X"]);
        assert!(inv.move_to_rma("SN-X").is_err());
        assert!(inv.moves().is_empty());
        assert!(LoggingInventory.move_to_rma("SN-X").is_ok());
    }
}
