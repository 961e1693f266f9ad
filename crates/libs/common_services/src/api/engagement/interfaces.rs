use serde::Serialize;

/// Result of `add_like`. Liking twice is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LikeOutcome {
    Liked,
    AlreadyLiked,
}

impl LikeOutcome {
    #[must_use]
    pub const fn already_liked(self) -> bool {
        matches!(self, Self::AlreadyLiked)
    }
}

/// Result of `remove_like`. Removing a like that isn't there is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UnlikeOutcome {
    Removed,
    NotFound,
}

impl UnlikeOutcome {
    #[must_use]
    pub const fn not_found(self) -> bool {
        matches!(self, Self::NotFound)
    }
}
