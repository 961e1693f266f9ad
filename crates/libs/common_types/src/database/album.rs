use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::fmt::Display;
use std::str::FromStr;
use thiserror::Error;

/// A role that is stored as a permission row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "album_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AlbumRole {
    Owner,
    Editor,
    Viewer,
}

impl Display for AlbumRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Owner => "owner",
            Self::Editor => "editor",
            Self::Viewer => "viewer",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
#[error("Unknown album role: {0}")]
pub struct ParseRoleError(String);

impl FromStr for AlbumRole {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "owner" => Ok(Self::Owner),
            "editor" => Ok(Self::Editor),
            "viewer" => Ok(Self::Viewer),
            _ => Err(ParseRoleError(s.to_owned())),
        }
    }
}

/// The role a caller effectively holds on an album.
///
/// `Contributor` is never stored. Any signed-in user holds it on an event album
/// when they have no explicit permission there.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EffectiveRole {
    Owner,
    Editor,
    Viewer,
    Contributor,
}

impl From<AlbumRole> for EffectiveRole {
    fn from(role: AlbumRole) -> Self {
        match role {
            AlbumRole::Owner => Self::Owner,
            AlbumRole::Editor => Self::Editor,
            AlbumRole::Viewer => Self::Viewer,
        }
    }
}

impl Display for EffectiveRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Owner => "owner",
            Self::Editor => "editor",
            Self::Viewer => "viewer",
            Self::Contributor => "contributor",
        };
        f.write_str(s)
    }
}

/// Represents a single album (or event) in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct Album {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub owner_id: String,
    /// Events accept uploads from every signed-in user. Fixed at creation.
    pub is_event: bool,
    pub created_at: DateTime<Utc>,
}

/// An album as listed to a particular user, together with that user's role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AlbumWithRole {
    #[serde(flatten)]
    pub album: Album,
    pub role: Option<EffectiveRole>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
pub struct NewAlbum {
    #[builder(into)]
    pub title: String,
    #[builder(into)]
    pub description: Option<String>,
    #[builder(default)]
    #[serde(default, skip_serializing)]
    pub is_event: bool,
}
