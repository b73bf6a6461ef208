pub mod ingest;
pub mod moderation;
pub mod notification;

pub use ingest::IngestService;
pub use moderation::{AdapterRegistry, ModerationQueue, RetryScheduler};
pub use notification::Dispatcher;
