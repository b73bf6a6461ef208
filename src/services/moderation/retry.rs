/// Retry scheduler: periodic sweep that requeues errored moderation
/// tasks so the queue processor picks them up again.
use crate::db::TaskRepo;
use crate::error::Result;
use crate::models::TaskStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct RetryScheduler {
    tasks: TaskRepo,
    interval: Duration,
    max_attempts: Option<u32>,
}

impl RetryScheduler {
    pub fn new(tasks: TaskRepo, interval: Duration, max_attempts: Option<u32>) -> Arc<Self> {
        Arc::new(Self {
            tasks,
            interval,
            max_attempts,
        })
    }

    /// One sweep: move every errored task back to pending, clearing its
    /// error message and preserving `attempts`. Tasks at the optional
    /// attempt cap stay in `error`.
    pub async fn sweep(&self) -> Result<usize> {
        let errored = self.tasks.with_status(TaskStatus::Error).await?;
        if errored.is_empty() {
            return Ok(0);
        }

        let mut requeued = 0;
        for task in errored {
            if let Some(cap) = self.max_attempts {
                if task.attempts >= cap {
                    debug!(
                        task_id = %task.id,
                        attempts = task.attempts,
                        "retry cap reached, leaving task in error"
                    );
                    continue;
                }
            }
            if self.tasks.requeue(&task.id).await? {
                requeued += 1;
            }
        }

        if requeued > 0 {
            info!(requeued, "requeued errored moderation tasks");
        }
        Ok(requeued)
    }

    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "retry scheduler started"
        );
        let mut interval = tokio::time::interval(self.interval);
        // The first tick completes immediately; the sweep should wait a
        // full interval after startup recovery.
        interval.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("retry scheduler shutting down");
                        break;
                    }
                }
                _ = interval.tick() => {
                    match self.sweep().await {
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "retry sweep failed, will retry next interval"),
                    }
                }
            }
        }
    }
}
