use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// BatchStatus
// ---------------------------------------------------------------------------

/// RMA batch lifecycle.
///
/// ```text
/// DRAFT → SUBMITTED → SHIPPED → COMPLETED
/// ```
///
/// Strictly forward, one step at a time. Products can only be added or
/// removed in DRAFT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    #[default]
    Draft,
    Submitted,
    Shipped,
    Completed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::Shipped => "shipped",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "submitted" => Some(Self::Submitted),
            "shipped" => Some(Self::Shipped),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    /// The only status this one may advance to.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Draft => Some(Self::Submitted),
            Self::Submitted => Some(Self::Shipped),
            Self::Shipped => Some(Self::Completed),
            Self::Completed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.next().is_none()
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operations on a batch, named for error reporting and audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchAction {
    AddProduct,
    RemoveProduct,
    Finalize,
    Ship,
    Complete,
    UpdateShipping,
    UpdateNotes,
}

impl BatchAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AddProduct => "add_product",
            Self::RemoveProduct => "remove_product",
            Self::Finalize => "finalize",
            Self::Ship => "ship",
            Self::Complete => "complete",
            Self::UpdateShipping => "update_shipping",
            Self::UpdateNotes => "update_notes",
        }
    }

    /// Statuses in which the action is legal.
    pub fn allowed_in(&self) -> &'static [BatchStatus] {
        use BatchStatus::*;
        match self {
            Self::AddProduct | Self::RemoveProduct | Self::Finalize => &[Draft],
            Self::Ship => &[Submitted],
            Self::Complete => &[Shipped],
            Self::UpdateShipping => &[Draft, Submitted],
            Self::UpdateNotes => &[Draft, Submitted, Shipped],
        }
    }
}

impl std::fmt::Display for BatchAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// RmaBatch + BatchProduct
// ---------------------------------------------------------------------------

/// A set of returned units headed to one supplier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RmaBatch {
    pub id: String,
    /// Human-readable number, e.g. `RMA-20261018-0003`.
    pub batch_number: String,
    pub supplier_id: String,
    #[serde(default)]
    pub status: BatchStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,

    pub create_at: DateTime<Utc>,
    pub update_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipped_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// One serialized unit inside a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProduct {
    pub id: String,
    pub batch_id: String,
    pub serial_number: String,
    /// Physical product record, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    pub added_at: DateTime<Utc>,
}

/// Non-blocking notice attached to a successful operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "code",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum BatchWarning {
    /// Shipped without a tracking number.
    MissingTrackingNumber,
    /// The batch change committed but the unit's location move did not.
    InventoryNotUpdated { serial_number: String, message: String },
}

/// A batch with its products in insertion order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchView {
    pub batch: RmaBatch,
    pub products: Vec<BatchProduct>,
}

/// Result of a batch operation: the fresh snapshot plus any warnings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub batch: RmaBatch,
    pub products: Vec<BatchProduct>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<BatchWarning>,
}

// ---------------------------------------------------------------------------
// API request types
// ---------------------------------------------------------------------------

/// Body for `POST /batches`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBatchRequest {
    pub supplier_id: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
}

/// Body for `POST /batches/{id}/products`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddProductRequest {
    pub serial_number: String,
    #[serde(default)]
    pub product_id: Option<String>,
}

/// Shipping details, accepted by finalize, ship and the shipping update.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingInfo {
    #[serde(default)]
    pub shipping_date: Option<NaiveDate>,
    #[serde(default)]
    pub tracking_number: Option<String>,
}

/// Body for `PATCH /batches/{id}/notes`. `null` clears the notes.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotesRequest {
    #[serde(default)]
    pub notes: Option<String>,
}

/// Query parameters for `GET /batches`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchListQuery {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
    #[serde(default)]
    pub status: Option<BatchStatus>,
    #[serde(default)]
    pub supplier_id: Option<String>,
}
