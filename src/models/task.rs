use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a moderation task.
///
/// `pending -> processing -> {done | error}`; `error -> pending` happens
/// only through the retry sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Done,
    Error,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Done => "done",
            TaskStatus::Error => "error",
        }
    }
}

/// Final verdict persisted on a completed task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationVerdict {
    pub is_nsfw: bool,
    pub score: f64,
    pub provider: String,
}

/// One detection request per image, retained indefinitely as audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationTask {
    pub id: String,
    pub image_id: String,
    pub filename: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ModerationVerdict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ModerationTask {
    pub fn new(image_id: impl Into<String>, filename: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            image_id: image_id.into(),
            filename: filename.into(),
            status: TaskStatus::Pending,
            attempts: 0,
            result: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}
