use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A like on a media item. The id is always `{user_id}_{media_id}`, so a user can
/// like a media item at most once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Like {
    pub id: String,
    pub media_id: String,
    pub album_id: String,
    pub user_id: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

impl Like {
    #[must_use]
    pub fn id_for(user_id: &str, media_id: &str) -> String {
        format!("{user_id}_{media_id}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub media_id: String,
    pub album_id: String,
    pub user_id: String,
    pub display_name: String,
    /// Stored as typed. Escaping is up to whoever renders it.
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// One recorded view of a media item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Impression {
    pub id: String,
    pub media_id: String,
    pub user_id: String,
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

/// Denormalized counters for a media item.
///
/// Can always be rebuilt by counting the likes, comments and impressions of the media.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MediaStats {
    #[serde(default)]
    pub media_id: String,
    #[serde(default)]
    pub like_count: i64,
    #[serde(default)]
    pub comment_count: i64,
    #[serde(default)]
    pub view_count: i64,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl MediaStats {
    /// Stats for a media item that has never been liked, commented on or viewed.
    #[must_use]
    pub fn empty(media_id: impl Into<String>) -> Self {
        Self {
            media_id: media_id.into(),
            ..Self::default()
        }
    }
}
