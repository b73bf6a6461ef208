/// Content moderation: vendor detection adapters, the queue processor and
/// the retry sweep.
pub mod adapters;
pub mod queue;
pub mod retry;

pub use queue::ModerationQueue;
pub use retry::RetryScheduler;

use crate::error::{AppError, Result};
use crate::models::settings::default_providers;
use crate::models::{ContentSafetyConfig, ProviderConfig};
use adapters::{ElysiaToolsAdapter, NsfwDetAdapter, SelfHostedAdapter};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// Timeout applied to every outbound detection request.
pub const DETECT_TIMEOUT_SECS: u64 = 30;

/// Outcome of one vendor detection call. Never an error: every failure
/// mode lands in `success: false` with a descriptive message.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionResult {
    pub success: bool,
    pub is_nsfw: bool,
    pub score: f64,
    pub threshold: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Opaque vendor payload kept for audit; never parsed downstream.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_result: Option<Value>,
}

impl DetectionResult {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            is_nsfw: false,
            score: 0.0,
            threshold: 0.0,
            error: Some(error.into()),
            raw_result: None,
        }
    }
}

/// One vendor integration.
#[async_trait]
pub trait DetectionAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn detect(
        &self,
        image: &[u8],
        filename: &str,
        config: &ProviderConfig,
    ) -> DetectionResult;
}

/// Seam the queue processor talks to: resolves the configured provider
/// and runs its adapter.
#[async_trait]
pub trait Detector: Send + Sync {
    async fn moderate(
        &self,
        image: &[u8],
        filename: &str,
        config: &ContentSafetyConfig,
    ) -> DetectionResult;
}

/// Closed set of vendor adapters, selected by provider key.
pub struct AdapterRegistry {
    http: reqwest::Client,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    pub fn adapter_for(&self, key: &str) -> Option<Box<dyn DetectionAdapter>> {
        match key {
            "nsfwdet" => Some(Box::new(NsfwDetAdapter::new(self.http.clone()))),
            "elysiatools" => Some(Box::new(ElysiaToolsAdapter::new(self.http.clone()))),
            "nsfw_detector" => Some(Box::new(SelfHostedAdapter::new(self.http.clone()))),
            _ => None,
        }
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Detector for AdapterRegistry {
    async fn moderate(
        &self,
        image: &[u8],
        filename: &str,
        config: &ContentSafetyConfig,
    ) -> DetectionResult {
        let key = config.provider.as_str();
        let Some(adapter) = self.adapter_for(key) else {
            return DetectionResult::failure(format!("unsupported detection provider: {key}"));
        };
        let Some(provider_config) = config.provider_config(key) else {
            return DetectionResult::failure(format!("no configuration for provider: {key}"));
        };
        adapter.detect(image, filename, &provider_config).await
    }
}

/// Catalog entry surfaced to the admin UI.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub key: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_api_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_threshold: Option<f64>,
}

pub fn provider_catalog() -> Vec<ProviderInfo> {
    default_providers()
        .into_iter()
        .map(|(key, config)| ProviderInfo {
            key,
            name: config.name,
            default_api_url: (!config.api_url.is_empty()).then_some(config.api_url),
            default_threshold: config.threshold,
        })
        .collect()
}

pub fn is_known_provider(key: &str) -> bool {
    default_providers().contains_key(key)
}

/// Validate an operator-supplied provider block before saving it.
pub fn validate_provider_config(key: &str, config: &ProviderConfig) -> Result<()> {
    if !is_known_provider(key) {
        return Err(AppError::Validation(format!(
            "unsupported detection provider: {key}"
        )));
    }
    if let Some(threshold) = config.threshold {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(AppError::Validation(
                "threshold must be a number between 0 and 1".to_string(),
            ));
        }
    }
    Ok(())
}

/// MIME type inferred from the filename extension, for multipart uploads.
pub(crate) fn mime_type(filename: &str) -> &'static str {
    let ext = filename
        .rsplit('.')
        .next()
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        "ico" => "image/x-icon",
        "tiff" | "tif" => "image/tiff",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_type() {
        assert_eq!(mime_type("a.JPG"), "image/jpeg");
        assert_eq!(mime_type("b.webp"), "image/webp");
        assert_eq!(mime_type("noext"), "application/octet-stream");
    }

    #[test]
    fn test_provider_catalog_is_closed_set() {
        let catalog = provider_catalog();
        let keys: Vec<_> = catalog.iter().map(|p| p.key.as_str()).collect();
        assert!(keys.contains(&"nsfwdet"));
        assert!(keys.contains(&"elysiatools"));
        assert!(keys.contains(&"nsfw_detector"));
        assert!(is_known_provider("nsfwdet"));
        assert!(!is_known_provider("acme"));
    }

    #[test]
    fn test_validate_provider_config() {
        let mut config = ProviderConfig::default();
        assert!(validate_provider_config("nsfwdet", &config).is_ok());

        config.threshold = Some(1.5);
        assert!(validate_provider_config("nsfwdet", &config).is_err());

        config.threshold = Some(0.7);
        assert!(validate_provider_config("nope", &config).is_err());
    }

    #[tokio::test]
    async fn test_unknown_provider_is_config_error() {
        let registry = AdapterRegistry::new();
        let mut config = ContentSafetyConfig::default();
        config.provider = "acme".to_string();
        let result = registry.moderate(b"bytes", "a.png", &config).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("unsupported"));
    }
}
