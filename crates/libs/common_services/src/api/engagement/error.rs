use crate::document_store::StoreError;
use crate::error::{ErrorKind, UserFacingError};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum EngagementError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl UserFacingError for EngagementError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Store(e) => e.kind(),
        }
    }
}

pub(crate) fn log_error(error: &EngagementError) {
    match error {
        EngagementError::NotFound(message) => warn!("Engagement -> Not found: {}", message),
        EngagementError::Forbidden(message) => warn!("Engagement -> Forbidden: {}", message),
        EngagementError::InvalidInput(message) => warn!("Engagement -> Bad input: {}", message),
        EngagementError::Store(e) => warn!("Document store failed: {}", e),
    }
}
