pub mod api;
pub mod error;
pub mod inventory;
pub mod lifecycle;
pub mod model;
pub mod service;
pub mod store;

use std::sync::Arc;

use axum::Router;
use depot_core::{AuditSink, Module, ServiceError};
use depot_sql::SQLStore;
use serde::Deserialize;

pub use error::BatchError;
pub use inventory::{Inventory, LoggingInventory, RecordingInventory};
pub use service::RmaService;
use store::RmaStore;

/// `[rma]` settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RmaConfig {
    /// Leading part of generated batch numbers.
    pub batch_prefix: String,
}

impl Default for RmaConfig {
    fn default() -> Self {
        Self {
            batch_prefix: "RMA".to_string(),
        }
    }
}

/// The RMA module: batches of returned units shipped back to suppliers.
pub struct RmaModule {
    service: Arc<RmaService>,
}

impl RmaModule {
    /// Create the module and initialise its tables.
    pub fn new(
        db: Arc<dyn SQLStore>,
        inventory: Arc<dyn Inventory>,
        audit: Arc<dyn AuditSink>,
        config: &RmaConfig,
    ) -> Result<Self, ServiceError> {
        let prefix = config.batch_prefix.trim();
        if prefix.is_empty() {
            return Err(ServiceError::Validation("rma.batch_prefix must not be empty".into()));
        }
        let store = RmaStore::new(db)?;
        Ok(Self {
            service: Arc::new(RmaService::new(store, inventory, audit, prefix)),
        })
    }

    pub fn service(&self) -> &Arc<RmaService> {
        &self.service
    }
}

impl Module for RmaModule {
    fn name(&self) -> &str {
        "rma"
    }

    fn routes(&self) -> Router {
        api::router(Arc::clone(&self.service))
    }
}
