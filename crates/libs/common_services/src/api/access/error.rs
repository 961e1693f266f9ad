use crate::database::DbError;
use crate::error::{ErrorKind, UserFacingError};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("Not signed in")]
    Unauthenticated,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

impl UserFacingError for AccessError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthenticated => ErrorKind::Unauthenticated,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Database(DbError::Constraint(_)) => ErrorKind::Conflict,
            Self::Database(DbError::Sqlx(_)) => ErrorKind::Transient,
            Self::Database(DbError::Migrate(_) | DbError::SerdeJson(_)) => ErrorKind::Internal,
        }
    }
}

pub(crate) fn log_error(error: &AccessError) {
    match error {
        AccessError::Unauthenticated => warn!("Album access -> not signed in"),
        AccessError::Forbidden(message) => warn!("Album access -> Forbidden: {}", message),
        AccessError::NotFound(message) => warn!("Album access -> Not found: {}", message),
        AccessError::InvalidInput(message) => warn!("Album access -> Bad input: {}", message),
        AccessError::Database(e) => warn!("Database query failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_into_taxonomy() {
        assert_eq!(AccessError::Unauthenticated.kind(), ErrorKind::Unauthenticated);
        assert_eq!(
            AccessError::Forbidden("x".to_owned()).kind(),
            ErrorKind::Forbidden
        );
        assert_eq!(
            AccessError::Database(DbError::Constraint("dup".to_owned())).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            AccessError::Database(DbError::Sqlx(sqlx::Error::PoolTimedOut)).kind(),
            ErrorKind::Transient
        );
        assert!(
            AccessError::Database(DbError::Sqlx(sqlx::Error::PoolTimedOut))
                .kind()
                .is_retryable()
        );
    }

    #[test]
    fn invalid_input_message_is_shown_verbatim() {
        let err = AccessError::InvalidInput("Album title cannot be empty".to_owned());
        assert_eq!(err.user_message(), "Invalid input: Album title cannot be empty");
    }
}
