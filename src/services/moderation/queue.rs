/// Queue processor: single-flight worker that claims pending moderation
/// tasks, runs the configured detection adapter and persists the outcome.
use super::{DetectionResult, Detector};
use crate::db::{ImageRepo, SettingsRepo, TaskRepo};
use crate::error::Result;
use crate::models::{ImageRecord, ModerationTask, ModerationVerdict};
use crate::services::notification::{DeliveryResult, Dispatcher};
use crate::storage::ImageStorage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct ModerationQueue {
    tasks: TaskRepo,
    images: ImageRepo,
    settings: SettingsRepo,
    storage: Arc<ImageStorage>,
    detector: Arc<dyn Detector>,
    dispatcher: Arc<Dispatcher>,
    poll_interval: Duration,
    public_base_url: String,
}

impl ModerationQueue {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tasks: TaskRepo,
        images: ImageRepo,
        settings: SettingsRepo,
        storage: Arc<ImageStorage>,
        detector: Arc<dyn Detector>,
        dispatcher: Arc<Dispatcher>,
        poll_interval: Duration,
        public_base_url: String,
    ) -> Arc<Self> {
        Arc::new(Self {
            tasks,
            images,
            settings,
            storage,
            detector,
            dispatcher,
            poll_interval,
            public_base_url,
        })
    }

    /// Create the moderation task for a newly ingested image. There is
    /// exactly one task per image; re-enqueueing returns the existing one.
    pub async fn enqueue(&self, image: &ImageRecord) -> Result<ModerationTask> {
        if let Some(existing) = self.tasks.find_by_image(&image.id).await? {
            return Ok(existing);
        }
        let task = ModerationTask::new(&image.id, &image.filename);
        self.tasks.create(&task).await?;
        info!(task_id = %task.id, image_id = %image.id, "moderation task enqueued");
        Ok(task)
    }

    /// Startup recovery: requeue tasks a crashed worker left `processing`.
    pub async fn recover(&self) -> Result<usize> {
        let requeued = self.tasks.requeue_stuck().await?;
        if requeued > 0 {
            info!(requeued, "requeued tasks stuck in processing");
        }
        Ok(requeued)
    }

    /// Claim and process one task. Returns `Ok(false)` when there is
    /// nothing to do (no pending tasks, or moderation switched off).
    pub async fn process_next(&self) -> Result<bool> {
        let config = self.settings.content_safety_config().await?;
        if !config.enabled {
            return Ok(false);
        }

        let Some(task) = self.tasks.claim_next().await? else {
            return Ok(false);
        };
        debug!(task_id = %task.id, attempts = task.attempts, "processing moderation task");

        let result = match self.storage.read_file(&task.filename).await {
            Ok(bytes) => {
                self.detector
                    .moderate(&bytes, &task.filename, &config)
                    .await
            }
            Err(e) => DetectionResult::failure(e.to_string()),
        };

        if result.success {
            let verdict = ModerationVerdict {
                is_nsfw: result.is_nsfw,
                score: result.score,
                provider: config.provider.clone(),
            };
            self.tasks.complete(&task.id, &verdict).await?;
            info!(
                task_id = %task.id,
                is_nsfw = verdict.is_nsfw,
                score = verdict.score,
                provider = %verdict.provider,
                "moderation task done"
            );
            // Notify, don't transact: the task is already durable, a
            // delivery failure must not roll it back.
            self.notify_outcome(&task, &verdict).await;
        } else {
            let message = result
                .error
                .unwrap_or_else(|| "detection failed".to_string());
            self.tasks.fail(&task.id, &message).await?;
            warn!(task_id = %task.id, error = %message, "moderation task failed");
        }

        Ok(true)
    }

    async fn notify_outcome(&self, task: &ModerationTask, verdict: &ModerationVerdict) {
        let url = match self.images.get(&task.image_id).await {
            Ok(Some(image)) => Some(image.public_url(&self.public_base_url)),
            Ok(None) => None,
            Err(e) => {
                warn!(task_id = %task.id, "could not load image for notification: {e}");
                None
            }
        };
        let outcome = self
            .dispatcher
            .notify_nsfw(&task.image_id, &task.filename, url, verdict)
            .await;
        if let DeliveryResult::Failed { error } = outcome {
            warn!(task_id = %task.id, error = %error, "moderation notification failed");
        }
    }

    /// Worker loop: strictly serial task consumption until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_secs = self.poll_interval.as_secs(),
            "queue processor started"
        );
        let mut interval = tokio::time::interval(self.poll_interval);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("queue processor shutting down");
                        break;
                    }
                }
                _ = interval.tick() => {
                    loop {
                        match self.process_next().await {
                            Ok(true) => continue,
                            Ok(false) => break,
                            Err(e) => {
                                warn!(error = %e, "queue processing failed, will retry next poll");
                                break;
                            }
                        }
                    }
                }
            }
        }
    }
}
