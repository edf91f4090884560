use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Audit entry validation failed: {0}")]
    Validation(String),

    #[error("Audit storage error: {0}")]
    Storage(String),
}

pub type AuditResult<T> = Result<T, AuditError>;
