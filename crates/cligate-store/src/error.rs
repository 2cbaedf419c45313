use cligate_core::GatewayError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session not found: {0}")]
    NotFound(String),

    #[error("{operation} failed: {details}")]
    Storage {
        operation: &'static str,
        details: String,
    },
}

impl StoreError {
    pub fn storage(operation: &'static str, err: impl std::fmt::Display) -> Self {
        StoreError::Storage {
            operation,
            details: err.to_string(),
        }
    }
}

impl From<StoreError> for GatewayError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => GatewayError::SessionNotFound(id),
            StoreError::Storage { operation, details } => GatewayError::storage(operation, details),
        }
    }
}
