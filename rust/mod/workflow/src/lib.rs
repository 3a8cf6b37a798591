pub mod api;
pub mod error;
pub mod model;
pub mod sequencer;
pub mod service;
pub mod store;

use std::sync::Arc;

use axum::Router;
use depot_core::{AuditSink, Module, ServiceError};
use depot_sql::SQLStore;

pub use error::TaskError;
pub use sequencer::Sequencer;
pub use service::WorkflowService;
use store::WorkflowStore;

/// The Workflow module: task sequencing for tickets, stock documents
/// and service requests.
pub struct WorkflowModule {
    service: Arc<WorkflowService>,
}

impl WorkflowModule {
    /// Create the module and initialise its tables.
    pub fn new(db: Arc<dyn SQLStore>, audit: Arc<dyn AuditSink>) -> Result<Self, ServiceError> {
        let store = WorkflowStore::new(db)?;
        Ok(Self {
            service: Arc::new(WorkflowService::new(store, audit)),
        })
    }

    /// Direct access for in-process callers.
    pub fn service(&self) -> &Arc<WorkflowService> {
        &self.service
    }
}

impl Module for WorkflowModule {
    fn name(&self) -> &str {
        "workflow"
    }

    fn routes(&self) -> Router {
        api::router(Arc::clone(&self.service))
    }
}
