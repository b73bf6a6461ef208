use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted image document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: String,
    pub uuid: String,
    pub original_name: String,
    pub filename: String,
    pub format: String,
    pub size: u64,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub is_webp: bool,
    #[serde(default)]
    pub is_deleted: bool,
    pub uploaded_by: String,
    /// How the image entered the system ("url" for batch ingestion).
    pub uploaded_via: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ImageRecord {
    /// Site-relative URL the image is served under.
    pub fn relative_url(&self) -> String {
        format!("/i/{}", self.filename)
    }

    /// Public URL, absolute when a base URL is configured.
    pub fn public_url(&self, base_url: &str) -> String {
        if base_url.is_empty() {
            self.relative_url()
        } else {
            format!("{}{}", base_url.trim_end_matches('/'), self.relative_url())
        }
    }
}

/// Subset of image fields reported back to batch-ingestion callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSummary {
    pub id: String,
    pub uuid: String,
    pub filename: String,
    pub format: String,
    pub size: u64,
    pub width: u32,
    pub height: u32,
    pub url: String,
    pub uploaded_at: DateTime<Utc>,
}

impl From<&ImageRecord> for ImageSummary {
    fn from(record: &ImageRecord) -> Self {
        Self {
            id: record.id.clone(),
            uuid: record.uuid.clone(),
            filename: record.filename.clone(),
            format: record.format.clone(),
            size: record.size,
            width: record.width,
            height: record.height,
            url: record.relative_url(),
            uploaded_at: record.uploaded_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record() -> ImageRecord {
        let now = Utc::now();
        ImageRecord {
            id: "id-1".into(),
            uuid: "u-1".into(),
            original_name: "cat.png".into(),
            filename: "u-1.png".into(),
            format: "png".into(),
            size: 123,
            width: 10,
            height: 20,
            is_webp: false,
            is_deleted: false,
            uploaded_by: "admin".into(),
            uploaded_via: "url".into(),
            source_url: Some("https://example.com/cat.png".into()),
            uploaded_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_public_url() {
        let rec = record();
        assert_eq!(rec.relative_url(), "/i/u-1.png");
        assert_eq!(rec.public_url(""), "/i/u-1.png");
        assert_eq!(
            rec.public_url("https://img.example.com/"),
            "https://img.example.com/i/u-1.png"
        );
    }
}
