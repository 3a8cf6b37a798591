use thiserror::Error;

#[derive(Error, Debug)]
pub enum SQLError {
    #[error("query error: {0}")]
    Query(String),

    #[error("execution error: {0}")]
    Execution(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("transaction error: {0}")]
    Transaction(String),
}

impl SQLError {
    /// Whether the failure was a UNIQUE / PRIMARY KEY constraint violation.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            SQLError::Execution(msg) | SQLError::Transaction(msg) => {
                msg.contains("UNIQUE constraint")
            }
            _ => false,
        }
    }
}
