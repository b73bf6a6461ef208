use super::{Collection, Database};
use crate::error::{AppError, Result};
use crate::models::ImageRecord;
use serde_json::json;

/// Typed access to the `images` collection.
#[derive(Clone)]
pub struct ImageRepo {
    collection: Collection,
}

impl ImageRepo {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.images.clone(),
        }
    }

    pub async fn insert(&self, record: &ImageRecord) -> Result<()> {
        self.collection.insert(serde_json::to_value(record)?).await
    }

    pub async fn get(&self, id: &str) -> Result<Option<ImageRecord>> {
        self.collection
            .find_one(&json!({"id": id}))
            .await?
            .map(|doc| {
                serde_json::from_value(doc)
                    .map_err(|e| AppError::Database(format!("malformed image record: {e}")))
            })
            .transpose()
    }

    pub async fn count(&self) -> Result<usize> {
        self.collection.count(&json!({})).await
    }
}
