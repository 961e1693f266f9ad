use crate::document_store::DocumentRef;
use crate::error::{ErrorKind, UserFacingError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Document {0} already exists")]
    AlreadyExists(DocumentRef),

    #[error("Document {0} does not exist")]
    NotFound(DocumentRef),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Could not decode document: {0}")]
    Decode(#[from] serde_json::Error),
}

impl UserFacingError for StoreError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyExists(_) => ErrorKind::Conflict,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Database(_) => ErrorKind::Transient,
            Self::Decode(_) => ErrorKind::Internal,
        }
    }
}
