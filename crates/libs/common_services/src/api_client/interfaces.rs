use common_types::{Album, AlbumRole, AlbumWithRole, Media, PermissionSummary, User};
use serde::{Deserialize, Serialize};

// --- Request Payloads ---

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAlbumRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddPermissionRequest {
    pub email: String,
    pub role: AlbumRole,
}

/// One file of a multi-file upload.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }

    #[must_use]
    pub fn mime_type(&self) -> String {
        mime_guess::from_path(&self.filename)
            .first_or_octet_stream()
            .to_string()
    }
}

// --- Response Envelopes ---

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub user: User,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UsersResponse {
    pub users: Vec<User>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AlbumsResponse {
    pub albums: Vec<AlbumWithRole>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AlbumResponse<T = Album> {
    pub album: T,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PermissionsResponse {
    pub permissions: Vec<PermissionSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PermissionResponse {
    pub permission: PermissionSummary,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MediaResponse {
    pub media: Vec<Media>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EventsResponse {
    pub events: Vec<Album>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EventResponse {
    pub event: Album,
}
