use super::{Collection, Database};
use crate::error::Result;
use crate::models::{ContentSafetyConfig, NotificationConfig};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

pub const NOTIFICATION_CONFIG_KEY: &str = "notification_config";
pub const CONTENT_SAFETY_CONFIG_KEY: &str = "content_safety_config";

/// One document per key: `{key, value, updated_at}`.
#[derive(Clone)]
pub struct SettingsRepo {
    collection: Collection,
}

impl SettingsRepo {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.settings.clone(),
        }
    }

    /// Load a settings value, merging the stored document over the type's
    /// defaults (missing fields pick up their serde defaults). A missing
    /// or malformed document yields the defaults.
    pub async fn load<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T> {
        let doc = self.collection.find_one(&json!({"key": key})).await?;
        let Some(value) = doc.and_then(|mut d| d.get_mut("value").map(serde_json::Value::take))
        else {
            return Ok(T::default());
        };
        match serde_json::from_value(value) {
            Ok(parsed) => Ok(parsed),
            Err(e) => {
                tracing::warn!(key, "stored settings value is malformed, using defaults: {e}");
                Ok(T::default())
            }
        }
    }

    pub async fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.collection
            .update(
                &json!({"key": key}),
                &json!({
                    "value": serde_json::to_value(value)?,
                    "updated_at": Utc::now(),
                }),
                true,
            )
            .await?;
        Ok(())
    }

    pub async fn notification_config(&self) -> Result<NotificationConfig> {
        self.load(NOTIFICATION_CONFIG_KEY).await
    }

    pub async fn save_notification_config(&self, config: &NotificationConfig) -> Result<()> {
        self.save(NOTIFICATION_CONFIG_KEY, config).await
    }

    pub async fn content_safety_config(&self) -> Result<ContentSafetyConfig> {
        self.load(CONTENT_SAFETY_CONFIG_KEY).await
    }

    pub async fn save_content_safety_config(&self, config: &ContentSafetyConfig) -> Result<()> {
        self.save(CONTENT_SAFETY_CONFIG_KEY, config).await
    }
}
