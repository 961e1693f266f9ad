use crate::database::{AlbumRepository, DbError};
use async_trait::async_trait;
use chrono::Utc;
use common_types::{Album, AlbumRole, Media, Permission, PermissionSummary, User};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct AlbumTables {
    users: HashMap<String, User>,
    albums: HashMap<String, Album>,
    /// Keyed by (album id, user id).
    permissions: BTreeMap<(String, String), Permission>,
    media: HashMap<String, Media>,
}

/// In-process `AlbumRepository`, used by tests and tools that run without Postgres.
#[derive(Debug, Clone, Default)]
pub struct MemoryAlbumStore {
    tables: Arc<RwLock<AlbumTables>>,
}

impl MemoryAlbumStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AlbumRepository for MemoryAlbumStore {
    async fn upsert_user(&self, user: &User) -> Result<User, DbError> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .users
            .entry(user.id.clone())
            .and_modify(|existing| {
                existing.email.clone_from(&user.email);
                if user.display_name.is_some() {
                    existing.display_name.clone_from(&user.display_name);
                }
            })
            .or_insert_with(|| user.clone());
        Ok(stored.clone())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        let tables = self.tables.read().await;
        let email = email.trim();
        Ok(tables
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn create_album(&self, album: &Album) -> Result<(), DbError> {
        let mut tables = self.tables.write().await;
        if tables.albums.contains_key(&album.id) {
            return Err(DbError::Constraint(format!(
                "album {} already exists",
                album.id
            )));
        }
        tables.albums.insert(album.id.clone(), album.clone());
        tables.permissions.insert(
            (album.id.clone(), album.owner_id.clone()),
            Permission {
                album_id: album.id.clone(),
                user_id: album.owner_id.clone(),
                role: AlbumRole::Owner,
                granted_at: album.created_at,
            },
        );
        Ok(())
    }

    async fn find_album(&self, album_id: &str) -> Result<Option<Album>, DbError> {
        Ok(self.tables.read().await.albums.get(album_id).cloned())
    }

    async fn rename_album(
        &self,
        album_id: &str,
        title: &str,
        description: Option<&str>,
    ) -> Result<Option<Album>, DbError> {
        let mut tables = self.tables.write().await;
        let Some(album) = tables.albums.get_mut(album_id) else {
            return Ok(None);
        };
        title.clone_into(&mut album.title);
        if let Some(description) = description {
            album.description = Some(description.to_owned());
        }
        Ok(Some(album.clone()))
    }

    async fn delete_album(&self, album_id: &str) -> Result<bool, DbError> {
        let mut tables = self.tables.write().await;
        if tables.albums.remove(album_id).is_none() {
            return Ok(false);
        }
        tables.permissions.retain(|(a, _), _| a != album_id);
        tables.media.retain(|_, m| m.album_id != album_id);
        Ok(true)
    }

    async fn list_albums_for_user(&self, user_id: &str) -> Result<Vec<Album>, DbError> {
        let tables = self.tables.read().await;
        let mut albums: Vec<Album> = tables
            .albums
            .values()
            .filter(|a| {
                a.owner_id == user_id
                    || tables
                        .permissions
                        .contains_key(&(a.id.clone(), user_id.to_owned()))
            })
            .cloned()
            .collect();
        albums.sort_by_key(|a| Reverse(a.created_at));
        Ok(albums)
    }

    async fn list_events(&self) -> Result<Vec<Album>, DbError> {
        let tables = self.tables.read().await;
        let mut events: Vec<Album> = tables
            .albums
            .values()
            .filter(|a| a.is_event)
            .cloned()
            .collect();
        events.sort_by_key(|a| Reverse(a.created_at));
        Ok(events)
    }

    async fn find_permission(
        &self,
        album_id: &str,
        user_id: &str,
    ) -> Result<Option<Permission>, DbError> {
        let tables = self.tables.read().await;
        Ok(tables
            .permissions
            .get(&(album_id.to_owned(), user_id.to_owned()))
            .cloned())
    }

    async fn list_permissions(&self, album_id: &str) -> Result<Vec<PermissionSummary>, DbError> {
        let tables = self.tables.read().await;
        let mut permissions: Vec<&Permission> = tables
            .permissions
            .values()
            .filter(|p| p.album_id == album_id)
            .collect();
        permissions.sort_by_key(|p| p.granted_at);
        Ok(permissions
            .into_iter()
            .filter_map(|p| {
                tables.users.get(&p.user_id).map(|u| PermissionSummary {
                    user_id: p.user_id.clone(),
                    email: u.email.clone(),
                    display_name: u.display_name.clone(),
                    role: p.role,
                })
            })
            .collect())
    }

    async fn upsert_permission(
        &self,
        album_id: &str,
        user_id: &str,
        role: AlbumRole,
    ) -> Result<Permission, DbError> {
        let mut tables = self.tables.write().await;
        let key = (album_id.to_owned(), user_id.to_owned());
        if tables
            .permissions
            .get(&key)
            .is_some_and(|p| p.role == AlbumRole::Owner)
        {
            return Err(DbError::Constraint(format!(
                "the owner permission of album {album_id} cannot be changed"
            )));
        }
        let permission = Permission {
            album_id: album_id.to_owned(),
            user_id: user_id.to_owned(),
            role,
            granted_at: Utc::now(),
        };
        tables.permissions.insert(key, permission.clone());
        Ok(permission)
    }

    async fn delete_permission(&self, album_id: &str, user_id: &str) -> Result<bool, DbError> {
        let mut tables = self.tables.write().await;
        let key = (album_id.to_owned(), user_id.to_owned());
        let removable = tables
            .permissions
            .get(&key)
            .is_some_and(|p| p.role != AlbumRole::Owner);
        if removable {
            tables.permissions.remove(&key);
        }
        Ok(removable)
    }

    async fn insert_media(&self, media: &[Media]) -> Result<(), DbError> {
        let mut tables = self.tables.write().await;
        if let Some(duplicate) = media.iter().find(|m| tables.media.contains_key(&m.id)) {
            return Err(DbError::Constraint(format!(
                "media {} already exists",
                duplicate.id
            )));
        }
        for item in media {
            tables.media.insert(item.id.clone(), item.clone());
        }
        Ok(())
    }

    async fn find_media(&self, media_id: &str) -> Result<Option<Media>, DbError> {
        Ok(self.tables.read().await.media.get(media_id).cloned())
    }

    async fn list_media(&self, album_id: &str) -> Result<Vec<Media>, DbError> {
        let tables = self.tables.read().await;
        let mut media: Vec<Media> = tables
            .media
            .values()
            .filter(|m| m.album_id == album_id)
            .cloned()
            .collect();
        media.sort_by_key(|m| Reverse(m.created_at));
        Ok(media)
    }

    async fn delete_media(&self, media_id: &str) -> Result<bool, DbError> {
        Ok(self.tables.write().await.media.remove(media_id).is_some())
    }
}
