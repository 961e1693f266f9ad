use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct RawSettings {
    pub logging: LoggingSettings,
    pub api: RawApiSettings,
    pub secrets: SecretSettings,
    pub constants: RawConstants,
}

/// Logging configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
}

/// Where the REST album/media API lives.
#[derive(Debug, Deserialize, Clone)]
pub struct RawApiSettings {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SecretSettings {
    pub database_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RawConstants {
    pub database: DatabaseConstants,
    pub engagement: EngagementConstants,
}

/// Database connection and related configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConstants {
    pub max_connections: u32,
    pub min_connection: u32,
    pub max_lifetime: u64,
    pub idle_timeout: u64,
    pub acquire_timeout: u64,
    /// Length of generated `id` to use for albums.
    pub album_id_length: usize,
    /// Length of generated `id` to use for media rows.
    pub media_id_length: usize,
}

/// Settings for likes, comments and impressions.
#[derive(Debug, Deserialize, Clone)]
pub struct EngagementConstants {
    /// Length of generated document ids (comments, impressions).
    pub document_id_length: usize,
    /// Buffer size of the in-process change broadcast used by live subscriptions.
    pub broadcast_capacity: usize,
    /// User id recorded for impressions without a signed-in viewer.
    pub anonymous_user_id: String,
    /// Source label recorded for impressions that don't name one.
    pub default_impression_source: String,
}
