use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Delivery channel selected for outgoing notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationMethod {
    Webhook,
    Telegram,
    Email,
    PushGateway,
}

impl NotificationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationMethod::Webhook => "webhook",
            NotificationMethod::Telegram => "telegram",
            NotificationMethod::Email => "email",
            NotificationMethod::PushGateway => "push-gateway",
        }
    }
}

fn default_true() -> bool {
    true
}

/// Per-event-type opt-out switches. New event types default to enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationTypes {
    #[serde(default = "default_true")]
    pub login: bool,
    #[serde(default = "default_true")]
    pub upload: bool,
    #[serde(default = "default_true")]
    pub nsfw: bool,
}

impl Default for NotificationTypes {
    fn default() -> Self {
        Self {
            login: true,
            upload: true,
            nsfw: true,
        }
    }
}

fn default_webhook_method() -> String {
    "POST".to_string()
}

fn default_content_type() -> String {
    "application/json".to_string()
}

fn default_body_template() -> String {
    concat!(
        "{\n",
        "  \"type\": \"{{type}}\",\n",
        "  \"title\": \"{{title}}\",\n",
        "  \"message\": \"{{message}}\",\n",
        "  \"timestamp\": \"{{timestamp}}\",\n",
        "  \"data\": \"{{data}}\"\n",
        "}"
    )
    .to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_webhook_method")]
    pub method: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    /// Extra request headers, e.g. {"Authorization": "Bearer ..."}.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Request body template; {{type}}, {{title}}, {{message}},
    /// {{timestamp}} and {{data}} are substituted at dispatch time.
    #[serde(default = "default_body_template")]
    pub body_template: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            method: default_webhook_method(),
            content_type: default_content_type(),
            headers: BTreeMap::new(),
            body_template: default_body_template(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub chat_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailConfig {
    /// SMTP relay host, or a well-known provider name (gmail, qq, 163, outlook).
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub pass: String,
    /// Recipient; empty means send to the sender address.
    #[serde(default)]
    pub to: String,
}

fn default_push_gateway_endpoint() -> String {
    "https://sctapi.ftqq.com".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushGatewayConfig {
    #[serde(default = "default_push_gateway_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub send_key: String,
}

impl Default for PushGatewayConfig {
    fn default() -> Self {
        Self {
            endpoint: default_push_gateway_endpoint(),
            send_key: String::new(),
        }
    }
}

/// Process-wide notification settings, persisted under the
/// `notification_config` settings key. Every channel block is kept so
/// switching `method` never loses the other channels' credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_method")]
    pub method: NotificationMethod,
    #[serde(default)]
    pub types: NotificationTypes,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub push_gateway: PushGatewayConfig,
}

fn default_method() -> NotificationMethod {
    NotificationMethod::Webhook
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            method: NotificationMethod::Webhook,
            types: NotificationTypes::default(),
            webhook: WebhookConfig::default(),
            telegram: TelegramConfig::default(),
            email: EmailConfig::default(),
            push_gateway: PushGatewayConfig::default(),
        }
    }
}

/// Per-vendor detection settings. Fields are optional per vendor; empty
/// strings mean "use the vendor default" where one exists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub upload_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
}

/// Moderation settings, persisted under the `content_safety_config` key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentSafetyConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_providers")]
    pub providers: BTreeMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "elysiatools".to_string()
}

/// Vendor catalog with published defaults. The nsfwdet key is the
/// vendor's open default key; nsfw_detector is self-hosted and ships
/// without an endpoint.
static DEFAULT_PROVIDERS: Lazy<BTreeMap<String, ProviderConfig>> = Lazy::new(build_providers);

pub fn default_providers() -> BTreeMap<String, ProviderConfig> {
    DEFAULT_PROVIDERS.clone()
}

fn build_providers() -> BTreeMap<String, ProviderConfig> {
    let mut providers = BTreeMap::new();
    providers.insert(
        "nsfwdet".to_string(),
        ProviderConfig {
            name: "NSFW Detector".to_string(),
            api_url: "https://nsfwdet.com/api/v1/detect-nsfw".to_string(),
            api_key: "nsfw_2f7ab4f1d743d69ee242eec932b19671".to_string(),
            upload_url: String::new(),
            threshold: Some(0.5),
        },
    );
    providers.insert(
        "elysiatools".to_string(),
        ProviderConfig {
            name: "Elysia Tools".to_string(),
            api_url: "https://elysiatools.com/zh/api/tools/nsfw-image-detector".to_string(),
            api_key: String::new(),
            upload_url: "https://elysiatools.com/upload/nsfw-image-detector".to_string(),
            threshold: None,
        },
    );
    providers.insert(
        "nsfw_detector".to_string(),
        ProviderConfig {
            name: "nsfw_detector".to_string(),
            api_url: String::new(),
            api_key: String::new(),
            upload_url: String::new(),
            threshold: Some(0.8),
        },
    );
    providers
}

impl Default for ContentSafetyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_provider(),
            providers: default_providers(),
        }
    }
}

impl ContentSafetyConfig {
    /// Operator config for a provider key, falling back to the vendor
    /// defaults when the operator never touched that block.
    pub fn provider_config(&self, key: &str) -> Option<ProviderConfig> {
        self.providers
            .get(key)
            .cloned()
            .or_else(|| default_providers().get(key).cloned())
    }
}
