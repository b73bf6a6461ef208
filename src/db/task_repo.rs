use super::{Collection, Database};
use crate::error::{AppError, Result};
use crate::models::{ModerationTask, ModerationVerdict, TaskStatus};
use chrono::Utc;
use serde_json::{json, Value};

/// Typed access to the `moderation_tasks` collection.
#[derive(Clone)]
pub struct TaskRepo {
    collection: Collection,
}

fn decode(doc: Value) -> Result<ModerationTask> {
    serde_json::from_value(doc)
        .map_err(|e| AppError::Database(format!("malformed moderation task: {e}")))
}

impl TaskRepo {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.moderation_tasks.clone(),
        }
    }

    pub async fn create(&self, task: &ModerationTask) -> Result<()> {
        self.collection.insert(serde_json::to_value(task)?).await
    }

    pub async fn get(&self, id: &str) -> Result<Option<ModerationTask>> {
        self.collection
            .find_one(&json!({"id": id}))
            .await?
            .map(decode)
            .transpose()
    }

    pub async fn find_by_image(&self, image_id: &str) -> Result<Option<ModerationTask>> {
        self.collection
            .find_one(&json!({"image_id": image_id}))
            .await?
            .map(decode)
            .transpose()
    }

    /// All tasks, newest first.
    pub async fn list(&self) -> Result<Vec<ModerationTask>> {
        let mut tasks = self
            .collection
            .find(&json!({}))
            .await?
            .into_iter()
            .map(decode)
            .collect::<Result<Vec<_>>>()?;
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tasks)
    }

    pub async fn count_status(&self, status: TaskStatus) -> Result<usize> {
        self.collection
            .count(&json!({"status": status.as_str()}))
            .await
    }

    pub async fn with_status(&self, status: TaskStatus) -> Result<Vec<ModerationTask>> {
        let mut tasks = self
            .collection
            .find(&json!({"status": status.as_str()}))
            .await?
            .into_iter()
            .map(decode)
            .collect::<Result<Vec<_>>>()?;
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(tasks)
    }

    /// Claim the oldest pending task: a compare-and-set on
    /// `{id, status: pending}` that bumps `attempts`. Returns `None`
    /// when nothing is pending.
    pub async fn claim_next(&self) -> Result<Option<ModerationTask>> {
        for candidate in self.with_status(TaskStatus::Pending).await? {
            let attempts = candidate.attempts + 1;
            let now = Utc::now();
            let claimed = self
                .collection
                .update(
                    &json!({"id": candidate.id, "status": "pending"}),
                    &json!({
                        "status": "processing",
                        "attempts": attempts,
                        "updated_at": now,
                    }),
                    false,
                )
                .await?;
            if claimed == 1 {
                let mut task = candidate;
                task.status = TaskStatus::Processing;
                task.attempts = attempts;
                task.updated_at = now;
                return Ok(Some(task));
            }
            // Lost the race for this one; try the next candidate.
        }
        Ok(None)
    }

    pub async fn complete(&self, id: &str, verdict: &ModerationVerdict) -> Result<()> {
        self.collection
            .update(
                &json!({"id": id}),
                &json!({
                    "status": "done",
                    "result": serde_json::to_value(verdict)?,
                    "error_message": Value::Null,
                    "updated_at": Utc::now(),
                }),
                false,
            )
            .await?;
        Ok(())
    }

    pub async fn fail(&self, id: &str, message: &str) -> Result<()> {
        self.collection
            .update(
                &json!({"id": id}),
                &json!({
                    "status": "error",
                    "error_message": message,
                    "updated_at": Utc::now(),
                }),
                false,
            )
            .await?;
        Ok(())
    }

    /// Move one errored task back to pending, clearing its error message
    /// but keeping `attempts`. CAS against `status: error` so a task the
    /// processor just claimed is never resurrected.
    pub async fn requeue(&self, id: &str) -> Result<bool> {
        let updated = self
            .collection
            .update(
                &json!({"id": id, "status": "error"}),
                &json!({
                    "status": "pending",
                    "error_message": Value::Null,
                    "updated_at": Utc::now(),
                }),
                false,
            )
            .await?;
        Ok(updated == 1)
    }

    /// Startup recovery: anything left `processing` by a crash goes back
    /// to pending, since no worker will ever advance it.
    pub async fn requeue_stuck(&self) -> Result<usize> {
        self.collection
            .update(
                &json!({"status": "processing"}),
                &json!({"status": "pending", "updated_at": Utc::now()}),
                false,
            )
            .await
    }
}
