use crate::error::{ErrorKind, UserFacingError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The signed-in user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub uid: String,
    pub email: String,
    pub display_name: Option<String>,
}

impl CurrentUser {
    /// The name shown next to likes and comments.
    #[must_use]
    pub fn shown_name(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.email)
    }
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Not signed in")]
    NotSignedIn,

    #[error("Could not obtain an id token: {0}")]
    TokenUnavailable(String),
}

impl UserFacingError for IdentityError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::NotSignedIn => ErrorKind::Unauthenticated,
            Self::TokenUnavailable(_) => ErrorKind::Transient,
        }
    }
}

/// Supplies the current user and short-lived bearer tokens for them.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn current_user(&self) -> Option<CurrentUser>;

    async fn id_token(&self) -> Result<String, IdentityError>;
}

/// Returns the signed-in user, or `NotSignedIn`.
pub fn require_user(identity: &impl IdentityProvider) -> Result<CurrentUser, IdentityError> {
    identity.current_user().ok_or(IdentityError::NotSignedIn)
}

/// An identity that never changes. Used by tools and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    user: Option<CurrentUser>,
    token: String,
}

impl StaticIdentity {
    #[must_use]
    pub fn signed_in(user: CurrentUser, token: impl Into<String>) -> Self {
        Self {
            user: Some(user),
            token: token.into(),
        }
    }

    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    fn current_user(&self) -> Option<CurrentUser> {
        self.user.clone()
    }

    async fn id_token(&self) -> Result<String, IdentityError> {
        if self.user.is_none() {
            return Err(IdentityError::NotSignedIn);
        }
        Ok(self.token.clone())
    }
}
