use crate::error::{ErrorKind, UserFacingError};
use crate::identity::IdentityError;
use reqwest::StatusCode;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ApiClientError {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// The server answered with a non-2xx status.
    #[error("{message} ({status})")]
    Status { status: StatusCode, message: String },

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Base url {0} cannot have path segments")]
    InvalidBaseUrl(Url),
}

impl ApiClientError {
    /// The server's message for `Status` errors, the error itself otherwise.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Status { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl UserFacingError for ApiClientError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Identity(e) => e.kind(),
            Self::Status { status, .. } => match *status {
                StatusCode::UNAUTHORIZED => ErrorKind::Unauthenticated,
                StatusCode::FORBIDDEN => ErrorKind::Forbidden,
                StatusCode::NOT_FOUND => ErrorKind::NotFound,
                StatusCode::CONFLICT => ErrorKind::Conflict,
                _ => ErrorKind::Transient,
            },
            Self::Request(e) if e.is_decode() => ErrorKind::Internal,
            Self::Request(_) => ErrorKind::Transient,
            Self::InvalidBaseUrl(_) => ErrorKind::Internal,
        }
    }

    fn user_message(&self) -> String {
        match self {
            Self::Status { message, .. } => message.clone(),
            _ => match self.kind() {
                ErrorKind::Unauthenticated => "Please sign in first.".to_owned(),
                ErrorKind::Internal => "An unexpected error occurred.".to_owned(),
                _ => "Something went wrong while talking to the server. Please try again."
                    .to_owned(),
            },
        }
    }
}
