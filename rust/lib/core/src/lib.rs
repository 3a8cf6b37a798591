pub mod audit;
pub mod config;
pub mod error;
pub mod module;
pub mod types;

pub use audit::{AuditEvent, AuditSink, MemoryAudit, TracingAudit};
pub use config::ServiceConfig;
pub use error::{error_code, error_response, ServiceError};
pub use module::Module;
pub use types::{new_id, now, now_rfc3339, page_limit, to_rfc3339, today, ListResult};
