use crate::database::album::AlbumRole;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A user's role on an album. At most one per (album, user) pair.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct Permission {
    pub album_id: String,
    #[serde(rename = "user_uid")]
    pub user_id: String,
    pub role: AlbumRole,
    pub granted_at: DateTime<Utc>,
}

/// A permission joined with the user it belongs to, as shown in a share dialog.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct PermissionSummary {
    #[serde(rename = "user_uid")]
    pub user_id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub role: AlbumRole,
}
