use crate::api::access::error::log_error;
use crate::api::access::{AccessError, AlbumAccess};
use crate::database::AlbumRepository;
use crate::identity::CurrentUser;
use crate::utils::nice_id;
use app_state::DatabaseConstants;
use chrono::Utc;
use common_types::{
    Album, AlbumRole, AlbumWithRole, Media, NewAlbum, NewMedia, Permission, PermissionSummary,
    User,
};
use tracing::{info, instrument};

/// The authoritative enforcement point for album access.
///
/// Every call re-resolves the caller's role from the repository. Whatever a client
/// decided up front using `access_for` is only a hint.
pub struct AccessService<R> {
    repo: R,
    album_id_length: usize,
    media_id_length: usize,
}

impl<R: AlbumRepository> AccessService<R> {
    pub fn new(repo: R, constants: &DatabaseConstants) -> Self {
        Self {
            repo,
            album_id_length: constants.album_id_length,
            media_id_length: constants.media_id_length,
        }
    }

    pub const fn repository(&self) -> &R {
        &self.repo
    }

    async fn load_access(
        &self,
        album_id: &str,
        caller: Option<&CurrentUser>,
    ) -> Result<(Album, AlbumAccess), AccessError> {
        let album = self
            .repo
            .find_album(album_id)
            .await?
            .ok_or_else(|| AccessError::NotFound(format!("album {album_id}")))?;
        let permission = match caller {
            Some(user) => self.repo.find_permission(album_id, &user.uid).await?,
            None => None,
        };
        let caller_id = caller.map(|u| u.uid.as_str());
        let access = AlbumAccess::resolve(&album, caller_id, permission.as_ref());
        Ok((album, access))
    }

    async fn remember_user(&self, caller: &CurrentUser) -> Result<User, AccessError> {
        let user = User {
            id: caller.uid.clone(),
            email: caller.email.clone(),
            display_name: caller.display_name.clone(),
            created_at: Utc::now(),
        };
        Ok(self.repo.upsert_user(&user).await?)
    }

    /// Registers or refreshes the signed-in user, so others can share albums with them.
    #[instrument(skip(self, caller))]
    pub async fn sync_user(&self, caller: Option<&CurrentUser>) -> Result<User, AccessError> {
        let caller = signed_in(caller)?;
        self.remember_user(caller).await.inspect_err(log_error)
    }

    /// What the caller may do on the album, for deciding which actions to offer.
    #[instrument(skip(self, caller))]
    pub async fn access_for(
        &self,
        album_id: &str,
        caller: Option<&CurrentUser>,
    ) -> Result<AlbumAccess, AccessError> {
        let (_, access) = self.load_access(album_id, caller).await?;
        Ok(access)
    }

    //================================================================================
    // Albums
    //================================================================================

    #[instrument(skip(self, caller))]
    pub async fn create_album(
        &self,
        caller: Option<&CurrentUser>,
        new_album: NewAlbum,
    ) -> Result<Album, AccessError> {
        let caller = signed_in(caller)?;
        let title = non_empty_title(&new_album.title)?;
        self.remember_user(caller).await?;

        let album = Album {
            id: nice_id(self.album_id_length),
            title,
            description: new_album.description,
            owner_id: caller.uid.clone(),
            is_event: new_album.is_event,
            created_at: Utc::now(),
        };
        self.repo
            .create_album(&album)
            .await
            .map_err(AccessError::from)
            .inspect_err(log_error)?;

        info!(album_id = %album.id, is_event = album.is_event, "Created album");
        Ok(album)
    }

    #[instrument(skip(self, caller))]
    pub async fn get_album(
        &self,
        caller: Option<&CurrentUser>,
        album_id: &str,
    ) -> Result<AlbumWithRole, AccessError> {
        let (album, access) = self.load_access(album_id, caller).await?;
        ensure(access.can_view(), caller, "view this album").inspect_err(log_error)?;
        Ok(AlbumWithRole {
            album,
            role: access.role(),
        })
    }

    /// Albums the caller owns or has been given a role on, newest first.
    #[instrument(skip(self, caller))]
    pub async fn list_albums(
        &self,
        caller: Option<&CurrentUser>,
    ) -> Result<Vec<AlbumWithRole>, AccessError> {
        let caller = signed_in(caller)?;
        let albums = self.repo.list_albums_for_user(&caller.uid).await?;
        self.with_roles(caller, albums).await
    }

    /// Every event, newest first. Any signed-in user can see and contribute to them.
    #[instrument(skip(self, caller))]
    pub async fn list_events(
        &self,
        caller: Option<&CurrentUser>,
    ) -> Result<Vec<AlbumWithRole>, AccessError> {
        let caller = signed_in(caller)?;
        let events = self.repo.list_events().await?;
        self.with_roles(caller, events).await
    }

    async fn with_roles(
        &self,
        caller: &CurrentUser,
        albums: Vec<Album>,
    ) -> Result<Vec<AlbumWithRole>, AccessError> {
        let mut listed = Vec::with_capacity(albums.len());
        for album in albums {
            let permission = self.repo.find_permission(&album.id, &caller.uid).await?;
            let access = AlbumAccess::resolve(&album, Some(&caller.uid), permission.as_ref());
            listed.push(AlbumWithRole {
                role: access.role(),
                album,
            });
        }
        Ok(listed)
    }

    #[instrument(skip(self, caller))]
    pub async fn rename_album(
        &self,
        caller: Option<&CurrentUser>,
        album_id: &str,
        title: &str,
        description: Option<&str>,
    ) -> Result<Album, AccessError> {
        let (_, access) = self.load_access(album_id, caller).await?;
        ensure(access.can_rename_album(), caller, "rename this album").inspect_err(log_error)?;
        let title = non_empty_title(title)?;

        let album = self
            .repo
            .rename_album(album_id, &title, description)
            .await?
            .ok_or_else(|| AccessError::NotFound(format!("album {album_id}")))?;
        info!(album_id, "Renamed album");
        Ok(album)
    }

    /// Deletes the album together with its media and permissions.
    #[instrument(skip(self, caller))]
    pub async fn delete_album(
        &self,
        caller: Option<&CurrentUser>,
        album_id: &str,
    ) -> Result<(), AccessError> {
        let (_, access) = self.load_access(album_id, caller).await?;
        ensure(access.can_delete_album(), caller, "delete this album").inspect_err(log_error)?;

        if !self.repo.delete_album(album_id).await? {
            return Err(AccessError::NotFound(format!("album {album_id}")));
        }
        info!(album_id, "Deleted album");
        Ok(())
    }

    //================================================================================
    // Permissions
    //================================================================================

    #[instrument(skip(self, caller))]
    pub async fn list_permissions(
        &self,
        caller: Option<&CurrentUser>,
        album_id: &str,
    ) -> Result<Vec<PermissionSummary>, AccessError> {
        let (_, access) = self.load_access(album_id, caller).await?;
        ensure(access.can_view(), caller, "view this album").inspect_err(log_error)?;
        Ok(self.repo.list_permissions(album_id).await?)
    }

    /// Gives the user with `target_email` a role on the album, replacing any role
    /// they already had. Only the owner may do this, and the owner role itself can
    /// never be handed out or taken away.
    #[instrument(skip(self, caller))]
    pub async fn grant_permission(
        &self,
        caller: Option<&CurrentUser>,
        album_id: &str,
        target_email: &str,
        role: AlbumRole,
    ) -> Result<Permission, AccessError> {
        let (album, access) = self.load_access(album_id, caller).await?;
        ensure(access.can_manage_permissions(), caller, "share this album")
            .inspect_err(log_error)?;

        let target = self
            .repo
            .find_user_by_email(target_email)
            .await?
            .ok_or_else(|| AccessError::NotFound(format!("user with email {target_email}")))
            .inspect_err(log_error)?;

        if role == AlbumRole::Owner {
            return Err(AccessError::Forbidden(
                "the owner role cannot be granted".to_owned(),
            ))
            .inspect_err(log_error);
        }
        if target.id == album.owner_id {
            return Err(AccessError::Forbidden(
                "the owner's role cannot be changed".to_owned(),
            ))
            .inspect_err(log_error);
        }

        let permission = self
            .repo
            .upsert_permission(album_id, &target.id, role)
            .await?;
        info!(album_id, user_id = %target.id, %role, "Granted permission");
        Ok(permission)
    }

    #[instrument(skip(self, caller))]
    pub async fn revoke_permission(
        &self,
        caller: Option<&CurrentUser>,
        album_id: &str,
        target_user_id: &str,
    ) -> Result<(), AccessError> {
        let (album, access) = self.load_access(album_id, caller).await?;
        ensure(access.can_manage_permissions(), caller, "share this album")
            .inspect_err(log_error)?;

        if target_user_id == album.owner_id {
            return Err(AccessError::Forbidden(
                "the owner's permission cannot be revoked".to_owned(),
            ))
            .inspect_err(log_error);
        }

        if !self.repo.delete_permission(album_id, target_user_id).await? {
            return Err(AccessError::NotFound(format!(
                "permission of {target_user_id} on album {album_id}"
            )))
            .inspect_err(log_error);
        }
        info!(album_id, user_id = target_user_id, "Revoked permission");
        Ok(())
    }

    //================================================================================
    // Media
    //================================================================================

    #[instrument(skip(self, caller))]
    pub async fn list_media(
        &self,
        caller: Option<&CurrentUser>,
        album_id: &str,
    ) -> Result<Vec<Media>, AccessError> {
        let (_, access) = self.load_access(album_id, caller).await?;
        ensure(access.can_view(), caller, "view this album").inspect_err(log_error)?;
        Ok(self.repo.list_media(album_id).await?)
    }

    /// Records uploaded blobs as media of the album, uploaded by the caller.
    #[instrument(skip(self, caller, files), fields(files = files.len()))]
    pub async fn add_media(
        &self,
        caller: Option<&CurrentUser>,
        album_id: &str,
        files: Vec<NewMedia>,
    ) -> Result<Vec<Media>, AccessError> {
        let (_, access) = self.load_access(album_id, caller).await?;
        ensure(access.can_upload(), caller, "upload to this album").inspect_err(log_error)?;
        let caller = signed_in(caller)?;
        if files.is_empty() {
            return Err(AccessError::InvalidInput("no files to add".to_owned()));
        }
        self.remember_user(caller).await?;

        let created_at = Utc::now();
        let media: Vec<Media> = files
            .into_iter()
            .map(|file| Media {
                id: nice_id(self.media_id_length),
                album_id: album_id.to_owned(),
                url: file.url,
                filename: file.filename,
                uploader_id: caller.uid.clone(),
                created_at,
            })
            .collect();
        self.repo.insert_media(&media).await?;

        info!(album_id, count = media.len(), "Added media");
        Ok(media)
    }

    #[instrument(skip(self, caller))]
    pub async fn delete_media(
        &self,
        caller: Option<&CurrentUser>,
        media_id: &str,
    ) -> Result<(), AccessError> {
        let media = self
            .repo
            .find_media(media_id)
            .await?
            .ok_or_else(|| AccessError::NotFound(format!("media {media_id}")))?;
        let (_, access) = self.load_access(&media.album_id, caller).await?;
        ensure(access.can_delete_media(&media), caller, "delete this media")
            .inspect_err(log_error)?;

        if !self.repo.delete_media(media_id).await? {
            return Err(AccessError::NotFound(format!("media {media_id}")));
        }
        info!(media_id, album_id = %media.album_id, "Deleted media");
        Ok(())
    }
}

fn signed_in(caller: Option<&CurrentUser>) -> Result<&CurrentUser, AccessError> {
    caller.ok_or(AccessError::Unauthenticated)
}

/// Turns a failed check into `Unauthenticated` for signed-out callers and
/// `Forbidden` for everyone else.
fn ensure(allowed: bool, caller: Option<&CurrentUser>, action: &str) -> Result<(), AccessError> {
    match (allowed, caller) {
        (true, _) => Ok(()),
        (false, None) => Err(AccessError::Unauthenticated),
        (false, Some(_)) => Err(AccessError::Forbidden(format!("not allowed to {action}"))),
    }
}

fn non_empty_title(title: &str) -> Result<String, AccessError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AccessError::InvalidInput(
            "album title cannot be empty".to_owned(),
        ));
    }
    Ok(title.to_owned())
}
