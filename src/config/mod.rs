/// Configuration management for pictor
///
/// Loads configuration from environment variables with sensible defaults.
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Server configuration
    pub host: String,
    pub port: u16,

    // Data locations
    pub data_dir: PathBuf,
    pub uploads_dir: PathBuf,

    // Base URL used when building public image links for notifications.
    // Empty means links stay relative.
    pub public_base_url: String,

    // Moderation queue
    pub queue_poll_secs: u64,
    pub retry_interval_secs: u64,
    pub retry_max_attempts: Option<u32>,

    // Batch URL ingestion
    pub batch_max_urls: usize,
    pub max_file_size: u64,
    pub download_timeout_secs: u64,
    pub convert_to_webp: bool,

    pub service_name: String,
    pub environment: String,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        // 0 and unset both mean "no retry cap".
        let retry_max_attempts = env::var("PICTOR_RETRY_MAX_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|n| *n > 0);

        Self {
            host: env_or("PICTOR_HOST", "0.0.0.0"),
            port: env_parse("PICTOR_PORT", 8080),
            data_dir: PathBuf::from(env_or("PICTOR_DATA_DIR", "db")),
            uploads_dir: PathBuf::from(env_or("PICTOR_UPLOADS_DIR", "uploads")),
            public_base_url: env_or("PICTOR_PUBLIC_BASE_URL", ""),
            queue_poll_secs: env_parse("PICTOR_QUEUE_POLL_SECS", 5),
            retry_interval_secs: env_parse("PICTOR_RETRY_INTERVAL_SECS", 3600),
            retry_max_attempts,
            batch_max_urls: env_parse("PICTOR_BATCH_MAX_URLS", 20),
            max_file_size: env_parse("PICTOR_MAX_FILE_SIZE", 100 * 1024 * 1024),
            download_timeout_secs: env_parse("PICTOR_DOWNLOAD_TIMEOUT_SECS", 30),
            convert_to_webp: env_parse("PICTOR_CONVERT_TO_WEBP", false),
            service_name: env_or("PICTOR_SERVICE_NAME", "pictor"),
            environment: env_or("PICTOR_ENV", "development"),
        }
    }
}
