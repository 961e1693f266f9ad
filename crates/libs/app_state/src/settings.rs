use crate::{AppConstants, LoggingSettings, RawSettings, SecretSettings};
use color_eyre::eyre::{Context, Result};
use serde::Deserialize;
use url::Url;

#[derive(Debug, Deserialize, Clone)]
pub struct AppSettings {
    pub logging: LoggingSettings,
    pub api: ApiSettings,
    pub secrets: SecretSettings,
    pub constants: AppConstants,
}

/// Configuration for the REST album/media API client.
#[derive(Debug, Deserialize, Clone)]
pub struct ApiSettings {
    /// Always ends with a `/`, so relative endpoint paths can be joined onto it.
    pub base_url: Url,
}

impl TryFrom<RawSettings> for AppSettings {
    type Error = color_eyre::Report;

    fn try_from(raw: RawSettings) -> Result<Self> {
        let mut base_url: Url = raw
            .api
            .base_url
            .parse()
            .wrap_err_with(|| format!("Invalid api.base_url: {}", raw.api.base_url))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            logging: raw.logging,
            api: ApiSettings { base_url },
            secrets: raw.secrets,
            constants: raw.constants.try_into()?,
        })
    }
}
