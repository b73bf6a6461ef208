/// Notification dispatch: one logical event fans out to whichever single
/// channel is currently configured.
pub mod email;
pub mod push_gateway;
pub mod telegram;
pub mod webhook;

use crate::db::SettingsRepo;
use crate::models::{
    ImageRecord, ModerationVerdict, NotificationConfig, NotificationMethod, NotificationTypes,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use email::EmailChannel;
use push_gateway::PushGatewayChannel;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use telegram::TelegramChannel;
use tracing::warn;
use webhook::WebhookChannel;

/// Timeout applied to every outbound delivery request.
pub const SEND_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Login,
    Upload,
    Nsfw,
    /// Synthetic event used by channel connectivity tests.
    Test,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Login => "login",
            EventType::Upload => "upload",
            EventType::Nsfw => "nsfw",
            EventType::Test => "test",
        }
    }
}

fn type_enabled(types: &NotificationTypes, event_type: EventType) -> bool {
    match event_type {
        EventType::Login => types.login,
        EventType::Upload => types.upload,
        EventType::Nsfw => types.nsfw,
        EventType::Test => true,
    }
}

/// What the caller hands to `dispatch`.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationPayload {
    pub title: String,
    pub message: String,
    pub data: Map<String, Value>,
}

/// Payload plus dispatch-time context, as seen by channel adapters.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(flatten)]
    pub payload: NotificationPayload,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DeliveryResult {
    Sent,
    Skipped { reason: String },
    Failed { error: String },
}

/// One delivery mechanism.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, config: &NotificationConfig, event: &Event) -> DeliveryResult;
}

/// Resolve `{{placeholder}}` tokens in one pass. Unknown placeholders are
/// left verbatim; replacement values are never re-scanned.
pub fn render_template(template: &str, vars: &BTreeMap<&str, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = &after[..end];
                match vars.get(key.trim()) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push_str("{{");
                        out.push_str(key);
                        out.push_str("}}");
                    }
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// The declared template variables for an event. Object values serialize
/// to canonical JSON (serde_json keeps object keys sorted), so rendering
/// is reproducible.
pub(crate) fn template_vars(event: &Event) -> BTreeMap<&'static str, String> {
    let mut vars = BTreeMap::new();
    vars.insert("type", event.event_type.as_str().to_string());
    vars.insert("title", event.payload.title.clone());
    vars.insert("message", event.payload.message.clone());
    vars.insert("timestamp", event.timestamp.to_rfc3339());
    vars.insert(
        "data",
        serde_json::to_string(&event.payload.data).unwrap_or_else(|_| "{}".to_string()),
    );
    vars
}

pub(crate) fn is_valid_image_url(url: &str) -> bool {
    reqwest::Url::parse(url)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Fully-qualified image URL carried in the event data, if any.
pub(crate) fn image_url_from(data: &Map<String, Value>) -> Option<&str> {
    ["url", "image_url"]
        .iter()
        .find_map(|key| data.get(*key).and_then(Value::as_str))
        .filter(|url| is_valid_image_url(url))
}

pub(crate) fn is_image_url_key(key: &str) -> bool {
    key == "url" || key == "image_url"
}

pub(crate) fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Routes events to the configured channel. Every dispatch loads a fresh
/// config snapshot so operator changes apply without a restart.
pub struct Dispatcher {
    settings: SettingsRepo,
    webhook: WebhookChannel,
    telegram: TelegramChannel,
    email: EmailChannel,
    push_gateway: PushGatewayChannel,
}

impl Dispatcher {
    pub fn new(settings: SettingsRepo) -> Arc<Self> {
        let http = reqwest::Client::new();
        Arc::new(Self {
            settings,
            webhook: WebhookChannel::new(http.clone()),
            telegram: TelegramChannel::new(http.clone()),
            email: EmailChannel::new(),
            push_gateway: PushGatewayChannel::new(http),
        })
    }

    fn channel(&self, method: NotificationMethod) -> &dyn NotificationChannel {
        match method {
            NotificationMethod::Webhook => &self.webhook,
            NotificationMethod::Telegram => &self.telegram,
            NotificationMethod::Email => &self.email,
            NotificationMethod::PushGateway => &self.push_gateway,
        }
    }

    pub async fn dispatch(
        &self,
        event_type: EventType,
        payload: NotificationPayload,
    ) -> DeliveryResult {
        let config = match self.settings.notification_config().await {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "could not load notification settings");
                return DeliveryResult::Failed {
                    error: format!("could not load notification settings: {e}"),
                };
            }
        };

        if !config.enabled {
            return DeliveryResult::Skipped {
                reason: "notifications are disabled".to_string(),
            };
        }
        if !type_enabled(&config.types, event_type) {
            return DeliveryResult::Skipped {
                reason: format!("{} notifications are disabled", event_type.as_str()),
            };
        }

        let event = Event {
            event_type,
            payload,
            timestamp: Utc::now(),
        };
        let channel = self.channel(config.method);
        let result = channel.send(&config, &event).await;
        match &result {
            DeliveryResult::Sent => {
                tracing::info!(
                    channel = channel.name(),
                    event = event.event_type.as_str(),
                    "notification delivered"
                );
            }
            DeliveryResult::Failed { error } => {
                warn!(
                    channel = channel.name(),
                    event = event.event_type.as_str(),
                    error = %error,
                    "notification delivery failed"
                );
            }
            DeliveryResult::Skipped { .. } => {}
        }
        result
    }

    /// Connectivity check: push a fixed test event through the candidate
    /// config's active channel, bypassing the enable switches.
    pub async fn test_channel(&self, config: &NotificationConfig) -> DeliveryResult {
        let mut data = Map::new();
        data.insert("test".to_string(), Value::Bool(true));
        let event = Event {
            event_type: EventType::Test,
            payload: NotificationPayload {
                title: "Test notification".to_string(),
                message: "This is a test notification verifying the channel configuration."
                    .to_string(),
                data,
            },
            timestamp: Utc::now(),
        };
        self.channel(config.method).send(config, &event).await
    }

    pub async fn notify_login(&self, username: &str, ip: &str, user_agent: &str) -> DeliveryResult {
        let mut data = Map::new();
        data.insert("username".to_string(), Value::from(username));
        data.insert("ip".to_string(), Value::from(ip));
        data.insert("user_agent".to_string(), Value::from(user_agent));
        data.insert(
            "login_time".to_string(),
            Value::from(Utc::now().to_rfc3339()),
        );
        self.dispatch(
            EventType::Login,
            NotificationPayload {
                title: "Login notification".to_string(),
                message: format!("User {username} signed in"),
                data,
            },
        )
        .await
    }

    pub async fn notify_upload(&self, record: &ImageRecord, url: &str) -> DeliveryResult {
        let mut data = Map::new();
        data.insert("image_id".to_string(), Value::from(record.id.as_str()));
        data.insert(
            "filename".to_string(),
            Value::from(record.filename.as_str()),
        );
        data.insert("format".to_string(), Value::from(record.format.as_str()));
        data.insert("size".to_string(), Value::from(record.size));
        data.insert("url".to_string(), Value::from(url));
        data.insert(
            "uploader".to_string(),
            Value::from(record.uploaded_by.as_str()),
        );
        data.insert(
            "uploaded_via".to_string(),
            Value::from(record.uploaded_via.as_str()),
        );
        data.insert(
            "upload_time".to_string(),
            Value::from(record.uploaded_at.to_rfc3339()),
        );
        self.dispatch(
            EventType::Upload,
            NotificationPayload {
                title: "Image upload notification".to_string(),
                message: format!("New image uploaded: {}", record.filename),
                data,
            },
        )
        .await
    }

    pub async fn notify_nsfw(
        &self,
        image_id: &str,
        filename: &str,
        url: Option<String>,
        verdict: &ModerationVerdict,
    ) -> DeliveryResult {
        let mut data = Map::new();
        data.insert("image_id".to_string(), Value::from(image_id));
        data.insert("filename".to_string(), Value::from(filename));
        if let Some(url) = url {
            data.insert("url".to_string(), Value::from(url));
        }
        data.insert("is_nsfw".to_string(), Value::from(verdict.is_nsfw));
        data.insert("score".to_string(), Value::from(verdict.score));
        data.insert(
            "provider".to_string(),
            Value::from(verdict.provider.as_str()),
        );
        data.insert(
            "check_time".to_string(),
            Value::from(Utc::now().to_rfc3339()),
        );

        let (title, message) = if verdict.is_nsfw {
            (
                "Image flagged by moderation".to_string(),
                format!("Image {filename} was flagged as NSFW content"),
            )
        } else {
            (
                "Image passed moderation".to_string(),
                format!("Image {filename} passed the moderation check"),
            )
        };
        self.dispatch(
            EventType::Nsfw,
            NotificationPayload {
                title,
                message,
                data,
            },
        )
        .await
    }
}
