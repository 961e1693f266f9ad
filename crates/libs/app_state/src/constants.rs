use crate::{DatabaseConstants, EngagementConstants, RawConstants};
use color_eyre::eyre::{Result, bail};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConstants {
    pub database: DatabaseConstants,
    pub engagement: EngagementConstants,
}

impl TryFrom<RawConstants> for AppConstants {
    type Error = color_eyre::Report;

    fn try_from(raw: RawConstants) -> Result<Self> {
        if raw.engagement.broadcast_capacity == 0 {
            bail!("constants.engagement.broadcast_capacity must be greater than zero");
        }
        if raw.engagement.document_id_length == 0
            || raw.database.album_id_length == 0
            || raw.database.media_id_length == 0
        {
            bail!("generated id lengths must be greater than zero");
        }

        Ok(Self {
            database: raw.database,
            engagement: raw.engagement,
        })
    }
}
