use crate::{AppSettings, RawSettings};
use color_eyre::eyre::{Context, Result};
use std::path::Path;
use tracing::debug;

pub const DEFAULT_SETTINGS_PATH: &str = "config/settings.yaml";

/// Loads settings from `config/settings.yaml`, overlaid by `APP__*` environment variables.
pub fn load_app_settings() -> Result<AppSettings> {
    load_app_settings_from(Path::new(DEFAULT_SETTINGS_PATH))
}

pub fn load_app_settings_from(config_path: &Path) -> Result<AppSettings> {
    // Need to load from dotenv to get it to overwrite the db url from env.
    dotenv::from_path(".env").ok();
    let config_path = config_path
        .canonicalize()
        .wrap_err_with(|| format!("Settings file not found: {}", config_path.display()))?;
    debug!("Loading settings from {}", config_path.display());

    let builder = config::Config::builder()
        .add_source(config::File::from(config_path))
        .add_source(
            config::Environment::with_prefix("APP")
                .separator("__")
                .try_parsing(true),
        );

    let raw_settings = builder.build()?.try_deserialize::<RawSettings>()?;
    raw_settings.try_into()
}
