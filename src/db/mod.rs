/// Document-store collaborator.
///
/// Collections hold schemaless JSON documents matched by field equality,
/// persisted as JSON-lines files under the data directory. Every mutation
/// happens under the collection write lock and rewrites the backing file
/// through a temp-file rename, so a single update call is an atomic
/// compare-and-set from the point of view of concurrent tasks.
pub mod image_repo;
pub mod settings_repo;
pub mod task_repo;

pub use image_repo::ImageRepo;
pub use settings_repo::SettingsRepo;
pub use task_repo::TaskRepo;

use crate::error::{AppError, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// The service's document collections.
pub struct Database {
    pub images: Collection,
    pub settings: Collection,
    pub moderation_tasks: Collection,
}

impl Database {
    pub async fn open(dir: &Path) -> Result<Arc<Self>> {
        tokio::fs::create_dir_all(dir).await?;
        Ok(Arc::new(Self {
            images: Collection::open(dir, "images").await?,
            settings: Collection::open(dir, "settings").await?,
            moderation_tasks: Collection::open(dir, "moderation_tasks").await?,
        }))
    }
}

struct CollectionInner {
    path: PathBuf,
    docs: RwLock<Vec<Value>>,
}

/// One named document collection.
#[derive(Clone)]
pub struct Collection {
    name: String,
    inner: Arc<CollectionInner>,
}

/// Every field in `filter` must equal the corresponding document field.
/// An empty filter matches every document.
fn matches(doc: &Value, filter: &Value) -> bool {
    match filter.as_object() {
        Some(fields) => fields
            .iter()
            .all(|(key, expected)| doc.get(key) == Some(expected)),
        None => false,
    }
}

impl Collection {
    pub async fn open(dir: &Path, name: &str) -> Result<Self> {
        let path = dir.join(format!("{name}.db"));
        let mut docs = Vec::new();
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                for line in contents.lines().filter(|l| !l.trim().is_empty()) {
                    let doc: Value = serde_json::from_str(line).map_err(|e| {
                        AppError::Database(format!("corrupt document in {name}: {e}"))
                    })?;
                    docs.push(doc);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(Self {
            name: name.to_string(),
            inner: Arc::new(CollectionInner {
                path,
                docs: RwLock::new(docs),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn find(&self, filter: &Value) -> Result<Vec<Value>> {
        let docs = self.inner.docs.read().await;
        Ok(docs.iter().filter(|d| matches(d, filter)).cloned().collect())
    }

    pub async fn find_one(&self, filter: &Value) -> Result<Option<Value>> {
        let docs = self.inner.docs.read().await;
        Ok(docs.iter().find(|d| matches(d, filter)).cloned())
    }

    pub async fn count(&self, filter: &Value) -> Result<usize> {
        let docs = self.inner.docs.read().await;
        Ok(docs.iter().filter(|d| matches(d, filter)).count())
    }

    pub async fn insert(&self, doc: Value) -> Result<()> {
        let mut docs = self.inner.docs.write().await;
        docs.push(doc);
        self.persist(&docs).await
    }

    /// Write `patch`'s fields into every matching document ($set
    /// semantics) and return how many matched. With `upsert`, a miss
    /// inserts filter ∪ patch as a new document.
    pub async fn update(&self, filter: &Value, patch: &Value, upsert: bool) -> Result<usize> {
        let patch_fields = patch
            .as_object()
            .ok_or_else(|| AppError::Database("update patch must be an object".to_string()))?;

        let mut docs = self.inner.docs.write().await;
        let mut updated = 0;
        for doc in docs.iter_mut().filter(|d| matches(d, filter)) {
            if let Some(fields) = doc.as_object_mut() {
                for (key, value) in patch_fields {
                    fields.insert(key.clone(), value.clone());
                }
                updated += 1;
            }
        }

        if updated == 0 && upsert {
            let mut fields = filter.as_object().cloned().unwrap_or_default();
            for (key, value) in patch_fields {
                fields.insert(key.clone(), value.clone());
            }
            docs.push(Value::Object(fields));
        }

        if updated > 0 || upsert {
            self.persist(&docs).await?;
        }
        Ok(updated)
    }

    pub async fn remove(&self, filter: &Value) -> Result<usize> {
        let mut docs = self.inner.docs.write().await;
        let before = docs.len();
        docs.retain(|d| !matches(d, filter));
        let removed = before - docs.len();
        if removed > 0 {
            self.persist(&docs).await?;
        }
        Ok(removed)
    }

    async fn persist(&self, docs: &[Value]) -> Result<()> {
        let mut contents = String::new();
        for doc in docs {
            contents.push_str(&serde_json::to_string(doc)?);
            contents.push('\n');
        }
        let tmp = self.inner.path.with_extension("db.tmp");
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, &self.inner.path).await?;
        Ok(())
    }
}
