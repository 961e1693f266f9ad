use crate::api_client::error::ApiClientError;
use crate::api_client::interfaces::{
    AddPermissionRequest, AlbumResponse, AlbumsResponse, ErrorBody, EventResponse,
    EventsResponse, MediaResponse, PermissionResponse, PermissionsResponse, UpdateAlbumRequest,
    UploadFile, UserResponse, UsersResponse,
};
use crate::identity::IdentityProvider;
use app_state::ApiSettings;
use common_types::{Album, AlbumRole, AlbumWithRole, Media, NewAlbum, PermissionSummary, User};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::{instrument, warn};
use url::Url;

/// Client for the REST album/media API.
///
/// Every request carries a fresh bearer token from the identity provider. No
/// timeout is configured beyond what the `http_client` brings along.
#[derive(Clone)]
pub struct AlbumApiClient<I> {
    http_client: Client,
    base_url: Url,
    identity: I,
}

impl<I: IdentityProvider> AlbumApiClient<I> {
    pub fn new(http_client: Client, settings: &ApiSettings, identity: I) -> Self {
        Self::with_base_url(http_client, settings.base_url.clone(), identity)
    }

    pub const fn with_base_url(http_client: Client, base_url: Url, identity: I) -> Self {
        Self {
            http_client,
            base_url,
            identity,
        }
    }

    pub const fn identity(&self) -> &I {
        &self.identity
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiClientError::InvalidBaseUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn request(
        &self,
        method: Method,
        segments: &[&str],
    ) -> Result<RequestBuilder, ApiClientError> {
        let token = self.identity.id_token().await?;
        Ok(self
            .http_client
            .request(method, self.endpoint(segments)?)
            .bearer_auth(token))
    }

    /// Sends the request and turns any non-2xx answer into `ApiClientError::Status`,
    /// preferring the server's `{"error": ...}` message over `fallback`.
    async fn send(
        request: RequestBuilder,
        fallback: &str,
    ) -> Result<reqwest::Response, ApiClientError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.error)
            .unwrap_or_else(|| fallback.to_owned());
        warn!("Album API returned {}: {}", status, message);
        Err(ApiClientError::Status { status, message })
    }

    async fn send_json<T: DeserializeOwned>(
        request: RequestBuilder,
        fallback: &str,
    ) -> Result<T, ApiClientError> {
        Ok(Self::send(request, fallback).await?.json().await?)
    }

    fn upload_form(files: Vec<UploadFile>) -> Result<Form, ApiClientError> {
        let mut form = Form::new();
        for file in files {
            let mime = file.mime_type();
            let part = Part::bytes(file.bytes)
                .file_name(file.filename)
                .mime_str(&mime)?;
            form = form.part("images", part);
        }
        Ok(form)
    }

    //================================================================================
    // Users
    //================================================================================

    #[instrument(skip(self))]
    pub async fn sync_user(&self) -> Result<User, ApiClientError> {
        let request = self.request(Method::POST, &["users", "sync"]).await?;
        let response: UserResponse = Self::send_json(request, "Sync failed").await?;
        Ok(response.user)
    }

    #[instrument(skip(self))]
    pub async fn search_users(&self, email: &str) -> Result<Vec<User>, ApiClientError> {
        let request = self
            .request(Method::GET, &["users", "search"])
            .await?
            .query(&[("email", email)]);
        let response: UsersResponse = Self::send_json(request, "Search failed").await?;
        Ok(response.users)
    }

    //================================================================================
    // Albums
    //================================================================================

    #[instrument(skip(self))]
    pub async fn list_albums(&self) -> Result<Vec<AlbumWithRole>, ApiClientError> {
        let request = self.request(Method::GET, &["albums"]).await?;
        let response: AlbumsResponse = Self::send_json(request, "Loading albums failed").await?;
        Ok(response.albums)
    }

    #[instrument(skip(self))]
    pub async fn create_album(&self, album: &NewAlbum) -> Result<Album, ApiClientError> {
        let request = self.request(Method::POST, &["albums"]).await?.json(album);
        let response: AlbumResponse = Self::send_json(request, "Creating album failed").await?;
        Ok(response.album)
    }

    #[instrument(skip(self))]
    pub async fn get_album(&self, album_id: &str) -> Result<AlbumWithRole, ApiClientError> {
        let request = self.request(Method::GET, &["albums", album_id]).await?;
        let response: AlbumResponse<AlbumWithRole> =
            Self::send_json(request, "Loading album failed").await?;
        Ok(response.album)
    }

    #[instrument(skip(self))]
    pub async fn update_album(
        &self,
        album_id: &str,
        update: &UpdateAlbumRequest,
    ) -> Result<Album, ApiClientError> {
        let request = self
            .request(Method::PATCH, &["albums", album_id])
            .await?
            .json(update);
        let response: AlbumResponse = Self::send_json(request, "Updating album failed").await?;
        Ok(response.album)
    }

    #[instrument(skip(self))]
    pub async fn delete_album(&self, album_id: &str) -> Result<(), ApiClientError> {
        let request = self.request(Method::DELETE, &["albums", album_id]).await?;
        Self::send(request, "Deleting album failed").await?;
        Ok(())
    }

    //================================================================================
    // Permissions
    //================================================================================

    #[instrument(skip(self))]
    pub async fn list_permissions(
        &self,
        album_id: &str,
    ) -> Result<Vec<PermissionSummary>, ApiClientError> {
        let request = self
            .request(Method::GET, &["albums", album_id, "permissions"])
            .await?;
        let response: PermissionsResponse =
            Self::send_json(request, "Loading permissions failed").await?;
        Ok(response.permissions)
    }

    #[instrument(skip(self))]
    pub async fn add_permission(
        &self,
        album_id: &str,
        email: &str,
        role: AlbumRole,
    ) -> Result<PermissionSummary, ApiClientError> {
        let body = AddPermissionRequest {
            email: email.trim().to_owned(),
            role,
        };
        let request = self
            .request(Method::POST, &["albums", album_id, "permissions"])
            .await?
            .json(&body);
        let response: PermissionResponse =
            Self::send_json(request, "Adding permission failed").await?;
        Ok(response.permission)
    }

    #[instrument(skip(self))]
    pub async fn remove_permission(
        &self,
        album_id: &str,
        user_uid: &str,
    ) -> Result<(), ApiClientError> {
        let request = self
            .request(Method::DELETE, &["albums", album_id, "permissions", user_uid])
            .await?;
        Self::send(request, "Removing permission failed").await?;
        Ok(())
    }

    //================================================================================
    // Media
    //================================================================================

    #[instrument(skip(self))]
    pub async fn list_media(&self, album_id: &str) -> Result<Vec<Media>, ApiClientError> {
        let request = self
            .request(Method::GET, &["albums", album_id, "media"])
            .await?;
        let response: MediaResponse = Self::send_json(request, "Loading media failed").await?;
        Ok(response.media)
    }

    /// Uploads all files in one multipart request and returns the created media.
    #[instrument(skip(self, files), fields(files = files.len()))]
    pub async fn upload_media(
        &self,
        album_id: &str,
        files: Vec<UploadFile>,
    ) -> Result<Vec<Media>, ApiClientError> {
        let request = self
            .request(Method::POST, &["albums", album_id, "upload"])
            .await?
            .multipart(Self::upload_form(files)?);
        let response: MediaResponse = Self::send_json(request, "Upload failed").await?;
        Ok(response.media)
    }

    #[instrument(skip(self))]
    pub async fn delete_media(&self, media_id: &str) -> Result<(), ApiClientError> {
        let request = self.request(Method::DELETE, &["media", media_id]).await?;
        Self::send(request, "Deleting media failed").await?;
        Ok(())
    }

    //================================================================================
    // Events
    //================================================================================

    #[instrument(skip(self))]
    pub async fn list_events(&self) -> Result<Vec<Album>, ApiClientError> {
        let request = self.request(Method::GET, &["events"]).await?;
        let response: EventsResponse = Self::send_json(request, "Loading events failed").await?;
        Ok(response.events)
    }

    #[instrument(skip(self))]
    pub async fn create_event(&self, event: &NewAlbum) -> Result<Album, ApiClientError> {
        let request = self.request(Method::POST, &["events"]).await?.json(event);
        let response: EventResponse = Self::send_json(request, "Creating event failed").await?;
        Ok(response.event)
    }

    #[instrument(skip(self))]
    pub async fn get_event(&self, event_id: &str) -> Result<Album, ApiClientError> {
        let request = self.request(Method::GET, &["events", event_id]).await?;
        let response: EventResponse = Self::send_json(request, "Loading event failed").await?;
        Ok(response.event)
    }

    #[instrument(skip(self, files), fields(files = files.len()))]
    pub async fn upload_event_media(
        &self,
        event_id: &str,
        files: Vec<UploadFile>,
    ) -> Result<Vec<Media>, ApiClientError> {
        let request = self
            .request(Method::POST, &["events", event_id, "upload"])
            .await?
            .multipart(Self::upload_form(files)?);
        let response: MediaResponse = Self::send_json(request, "Upload failed").await?;
        Ok(response.media)
    }

    #[instrument(skip(self))]
    pub async fn list_event_media(&self, event_id: &str) -> Result<Vec<Media>, ApiClientError> {
        let request = self
            .request(Method::GET, &["events", event_id, "media"])
            .await?;
        let response: MediaResponse =
            Self::send_json(request, "Loading event media failed").await?;
        Ok(response.media)
    }
}
