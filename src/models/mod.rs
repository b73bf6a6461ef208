pub mod image;
pub mod settings;
pub mod task;

pub use image::{ImageRecord, ImageSummary};
pub use settings::{
    ContentSafetyConfig, EmailConfig, NotificationConfig, NotificationMethod, NotificationTypes,
    ProviderConfig, PushGatewayConfig, TelegramConfig, WebhookConfig,
};
pub use task::{ModerationTask, ModerationVerdict, TaskStatus};
