use std::fmt;

/// The failure classes every service error is sorted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Nobody is signed in, but the operation needs a user.
    Unauthenticated,
    /// Signed in, but the role on the album is insufficient.
    Forbidden,
    /// The album, media, comment or user does not exist.
    NotFound,
    /// Duplicate like or permission.
    Conflict,
    /// Malformed input such as an empty comment.
    InvalidInput,
    /// Network or storage failure. Re-invoking the operation may succeed.
    Transient,
    /// A bug or corrupted data.
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Transient)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::InvalidInput => "invalid_input",
            Self::Transient => "transient",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Errors that can be shown to an end user.
///
/// Callers are expected to catch failures at their nearest boundary and display
/// `user_message()` instead of propagating the error further.
pub trait UserFacingError: std::error::Error {
    fn kind(&self) -> ErrorKind;

    fn user_message(&self) -> String {
        match self.kind() {
            ErrorKind::Unauthenticated => "Please sign in first.".to_owned(),
            ErrorKind::Forbidden => "You don't have permission to do that.".to_owned(),
            ErrorKind::NotFound => "That item no longer exists.".to_owned(),
            ErrorKind::Conflict => "That was already done.".to_owned(),
            ErrorKind::InvalidInput => self.to_string(),
            ErrorKind::Transient => {
                "Something went wrong while talking to the server. Please try again.".to_owned()
            }
            ErrorKind::Internal => "An unexpected error occurred.".to_owned(),
        }
    }
}
