use crate::database::DbError;
use async_trait::async_trait;
use common_types::{Album, AlbumRole, Media, Permission, PermissionSummary, User};
use sqlx::PgPool;

const ALBUM_COLUMNS: &str = "id, title, description, owner_id, is_event, created_at";
const MEDIA_COLUMNS: &str = "id, album_id, url, filename, uploader_id, created_at";

/// Persistence for albums, their permissions and their media.
///
/// Implementations only store data. Who may call what is decided by `AccessService`.
#[async_trait]
pub trait AlbumRepository: Send + Sync {
    //================================================================================
    // Users
    //================================================================================

    /// Inserts the user, or refreshes email and display name if they already exist.
    async fn upsert_user(&self, user: &User) -> Result<User, DbError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DbError>;

    //================================================================================
    // Core Album Management
    //================================================================================

    /// Inserts the album together with the owner's permission row, all or nothing.
    async fn create_album(&self, album: &Album) -> Result<(), DbError>;

    async fn find_album(&self, album_id: &str) -> Result<Option<Album>, DbError>;

    async fn rename_album(
        &self,
        album_id: &str,
        title: &str,
        description: Option<&str>,
    ) -> Result<Option<Album>, DbError>;

    /// Deletes the album with its permissions and media. Returns false if it did not exist.
    async fn delete_album(&self, album_id: &str) -> Result<bool, DbError>;

    /// Albums the user owns or holds a permission on, newest first.
    async fn list_albums_for_user(&self, user_id: &str) -> Result<Vec<Album>, DbError>;

    /// All event albums, newest first.
    async fn list_events(&self) -> Result<Vec<Album>, DbError>;

    //================================================================================
    // Permissions
    //================================================================================

    async fn find_permission(
        &self,
        album_id: &str,
        user_id: &str,
    ) -> Result<Option<Permission>, DbError>;

    async fn list_permissions(&self, album_id: &str) -> Result<Vec<PermissionSummary>, DbError>;

    /// Inserts a permission or overwrites the role of an existing one.
    /// The owner's permission row is never touched.
    async fn upsert_permission(
        &self,
        album_id: &str,
        user_id: &str,
        role: AlbumRole,
    ) -> Result<Permission, DbError>;

    /// Removes a non-owner permission. Returns false if there was nothing to remove.
    async fn delete_permission(&self, album_id: &str, user_id: &str) -> Result<bool, DbError>;

    //================================================================================
    // Media
    //================================================================================

    async fn insert_media(&self, media: &[Media]) -> Result<(), DbError>;

    async fn find_media(&self, media_id: &str) -> Result<Option<Media>, DbError>;

    /// Media of an album, newest first.
    async fn list_media(&self, album_id: &str) -> Result<Vec<Media>, DbError>;

    async fn delete_media(&self, media_id: &str) -> Result<bool, DbError>;
}

/// `AlbumRepository` backed by the Postgres tables from `migrations/`.
#[derive(Clone)]
pub struct PgAlbumStore {
    pool: PgPool,
}

impl PgAlbumStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AlbumRepository for PgAlbumStore {
    async fn upsert_user(&self, user: &User) -> Result<User, DbError> {
        Ok(sqlx::query_as::<_, User>(
            r"
            INSERT INTO app_user (id, email, display_name, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
                SET email = EXCLUDED.email,
                    display_name = COALESCE(EXCLUDED.display_name, app_user.display_name)
            RETURNING id, email, display_name, created_at
            ",
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(user.created_at)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        Ok(sqlx::query_as::<_, User>(
            "SELECT id, email, display_name, created_at FROM app_user WHERE lower(email) = lower($1)",
        )
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn create_album(&self, album: &Album) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"
            INSERT INTO album (id, title, description, owner_id, is_event, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(&album.id)
        .bind(&album.title)
        .bind(&album.description)
        .bind(&album.owner_id)
        .bind(album.is_event)
        .bind(album.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
            INSERT INTO album_permission (album_id, user_id, role, granted_at)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(&album.id)
        .bind(&album.owner_id)
        .bind(AlbumRole::Owner)
        .bind(album.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_album(&self, album_id: &str) -> Result<Option<Album>, DbError> {
        Ok(
            sqlx::query_as::<_, Album>(&format!("SELECT {ALBUM_COLUMNS} FROM album WHERE id = $1"))
                .bind(album_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn rename_album(
        &self,
        album_id: &str,
        title: &str,
        description: Option<&str>,
    ) -> Result<Option<Album>, DbError> {
        Ok(sqlx::query_as::<_, Album>(&format!(
            r"
            UPDATE album
            SET title = $1,
                description = COALESCE($2, description)
            WHERE id = $3
            RETURNING {ALBUM_COLUMNS}
            "
        ))
        .bind(title)
        .bind(description)
        .bind(album_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_album(&self, album_id: &str) -> Result<bool, DbError> {
        // Permissions and media cascade.
        let result = sqlx::query("DELETE FROM album WHERE id = $1")
            .bind(album_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_albums_for_user(&self, user_id: &str) -> Result<Vec<Album>, DbError> {
        Ok(sqlx::query_as::<_, Album>(
            r"
            SELECT a.id, a.title, a.description, a.owner_id, a.is_event, a.created_at
            FROM album a
            WHERE a.owner_id = $1
               OR EXISTS (
                    SELECT 1 FROM album_permission ap
                    WHERE ap.album_id = a.id AND ap.user_id = $1
               )
            ORDER BY a.created_at DESC
            ",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn list_events(&self) -> Result<Vec<Album>, DbError> {
        Ok(sqlx::query_as::<_, Album>(&format!(
            "SELECT {ALBUM_COLUMNS} FROM album WHERE is_event ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?)
    }

    async fn find_permission(
        &self,
        album_id: &str,
        user_id: &str,
    ) -> Result<Option<Permission>, DbError> {
        Ok(sqlx::query_as::<_, Permission>(
            r"
            SELECT album_id, user_id, role, granted_at
            FROM album_permission
            WHERE album_id = $1 AND user_id = $2
            ",
        )
        .bind(album_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list_permissions(&self, album_id: &str) -> Result<Vec<PermissionSummary>, DbError> {
        Ok(sqlx::query_as::<_, PermissionSummary>(
            r"
            SELECT ap.user_id, u.email, u.display_name, ap.role
            FROM album_permission ap
            JOIN app_user u ON ap.user_id = u.id
            WHERE ap.album_id = $1
            ORDER BY ap.granted_at
            ",
        )
        .bind(album_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn upsert_permission(
        &self,
        album_id: &str,
        user_id: &str,
        role: AlbumRole,
    ) -> Result<Permission, DbError> {
        let permission = sqlx::query_as::<_, Permission>(
            r"
            INSERT INTO album_permission (album_id, user_id, role)
            VALUES ($1, $2, $3)
            ON CONFLICT (album_id, user_id) DO UPDATE
                SET role = EXCLUDED.role, granted_at = now()
                WHERE album_permission.role <> 'owner'
            RETURNING album_id, user_id, role, granted_at
            ",
        )
        .bind(album_id)
        .bind(user_id)
        .bind(role)
        .fetch_optional(&self.pool)
        .await?;

        permission.ok_or_else(|| {
            DbError::Constraint(format!(
                "the owner permission of album {album_id} cannot be changed"
            ))
        })
    }

    async fn delete_permission(&self, album_id: &str, user_id: &str) -> Result<bool, DbError> {
        let result = sqlx::query(
            r"
            DELETE FROM album_permission
            WHERE album_id = $1 AND user_id = $2 AND role <> 'owner'
            ",
        )
        .bind(album_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_media(&self, media: &[Media]) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        for item in media {
            sqlx::query(
                r"
                INSERT INTO media (id, album_id, url, filename, uploader_id, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                ",
            )
            .bind(&item.id)
            .bind(&item.album_id)
            .bind(&item.url)
            .bind(&item.filename)
            .bind(&item.uploader_id)
            .bind(item.created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn find_media(&self, media_id: &str) -> Result<Option<Media>, DbError> {
        Ok(
            sqlx::query_as::<_, Media>(&format!("SELECT {MEDIA_COLUMNS} FROM media WHERE id = $1"))
                .bind(media_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn list_media(&self, album_id: &str) -> Result<Vec<Media>, DbError> {
        Ok(sqlx::query_as::<_, Media>(&format!(
            "SELECT {MEDIA_COLUMNS} FROM media WHERE album_id = $1 ORDER BY created_at DESC"
        ))
        .bind(album_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn delete_media(&self, media_id: &str) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM media WHERE id = $1")
            .bind(media_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
