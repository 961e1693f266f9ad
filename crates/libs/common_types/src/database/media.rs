use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A photo or video belonging to an album.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct Media {
    pub id: String,
    pub album_id: String,
    pub url: String,
    pub filename: String,
    #[serde(rename = "uploader_uid")]
    pub uploader_id: String,
    pub created_at: DateTime<Utc>,
}

/// An uploaded blob that has not been recorded in an album yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewMedia {
    pub url: String,
    pub filename: String,
}

impl Media {
    /// Checks the file extension of the media url against the common video formats.
    #[must_use]
    pub fn is_video(&self) -> bool {
        let path = self.url.split(['#', '?']).next().unwrap_or_default();
        path.rsplit_once('.').is_some_and(|(_, ext)| {
            matches!(
                ext.to_ascii_lowercase().as_str(),
                "mp4" | "webm" | "ogg" | "mov"
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::Media;
    use chrono::Utc;

    fn media(url: &str) -> Media {
        Media {
            id: "m1".to_owned(),
            album_id: "a1".to_owned(),
            url: url.to_owned(),
            filename: "file".to_owned(),
            uploader_id: "u1".to_owned(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn detects_video_urls() {
        assert!(media("https://cdn/x/clip.MP4?token=abc").is_video());
        assert!(media("https://cdn/x/clip.webm#t=3").is_video());
        assert!(!media("https://cdn/x/photo.jpg").is_video());
        assert!(!media("https://cdn/x/no-extension").is_video());
    }
}
