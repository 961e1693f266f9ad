#![allow(dead_code)]

use app_state::{DatabaseConstants, EngagementConstants};
use common_services::api::access::AccessService;
use common_services::api::engagement::EngagementService;
use common_services::database::MemoryAlbumStore;
use common_services::document_store::MemoryDocumentStore;
use common_services::identity::CurrentUser;
use common_types::NewMedia;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Environment variable holding the database the Postgres tests run against.
pub const DATABASE_URL_VAR: &str = "APP__SECRETS__DATABASE_URL";

pub fn database_constants() -> DatabaseConstants {
    DatabaseConstants {
        max_connections: 5,
        min_connection: 1,
        max_lifetime: 60,
        idle_timeout: 60,
        acquire_timeout: 5,
        album_id_length: 12,
        media_id_length: 16,
    }
}

pub fn engagement_constants() -> EngagementConstants {
    EngagementConstants {
        document_id_length: 20,
        broadcast_capacity: 16,
        anonymous_user_id: "anonymous".to_owned(),
        default_impression_source: "album_view".to_owned(),
    }
}

pub fn access_service() -> AccessService<MemoryAlbumStore> {
    AccessService::new(MemoryAlbumStore::new(), &database_constants())
}

pub fn engagement_service() -> EngagementService<MemoryDocumentStore> {
    EngagementService::new(MemoryDocumentStore::new(), &engagement_constants())
}

pub fn user(uid: &str) -> CurrentUser {
    CurrentUser {
        uid: uid.to_owned(),
        email: format!("{uid}@example.com"),
        display_name: Some(uid.to_uppercase()),
    }
}

pub fn new_media(filename: &str) -> NewMedia {
    NewMedia {
        url: format!("https://storage.example.com/{filename}"),
        filename: filename.to_owned(),
    }
}

/// Connects to the database in `APP__SECRETS__DATABASE_URL` and runs the migrations.
/// Returns `None` when no database is configured, so the calling test can skip itself.
pub async fn postgres_pool() -> color_eyre::Result<Option<PgPool>> {
    let Ok(url) = std::env::var(DATABASE_URL_VAR) else {
        println!("{DATABASE_URL_VAR} is not set, skipping Postgres test");
        return Ok(None);
    };
    let pool = PgPoolOptions::new().max_connections(10).connect(&url).await?;
    sqlx::migrate!("../../../migrations").run(&pool).await?;
    Ok(Some(pool))
}
