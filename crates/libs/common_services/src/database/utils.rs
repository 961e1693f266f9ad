use crate::database::DbError;
use app_state::AppSettings;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::info;

/// Run migrations and get a database connection pool.
///
/// # Errors
///
/// * `PgPool::connect` can return an error if the database connection fails.
/// * `sqlx::migrate` can return an error if migrations fail.
pub async fn get_db_pool(settings: &AppSettings) -> Result<Pool<Postgres>, DbError> {
    let db_constants = &settings.constants.database;
    info!("Connecting to database.");
    let pool = PgPoolOptions::new()
        .max_connections(db_constants.max_connections)
        .min_connections(db_constants.min_connection)
        .max_lifetime(Duration::from_secs(db_constants.max_lifetime))
        .idle_timeout(Duration::from_secs(db_constants.idle_timeout))
        .acquire_timeout(Duration::from_secs(db_constants.acquire_timeout))
        .test_before_acquire(true)
        .connect(&settings.secrets.database_url)
        .await?;
    sqlx::migrate!("../../../migrations").run(&pool).await?;
    Ok(pool)
}
