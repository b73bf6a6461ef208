/// Webhook channel: renders the operator's request-body template and
/// posts it with the configured method, headers and content type.
use super::{template_vars, DeliveryResult, Event, NotificationChannel, SEND_TIMEOUT_SECS};
use crate::models::NotificationConfig;
use async_trait::async_trait;
use reqwest::Method;
use std::time::Duration;

/// Length of the response-body excerpt carried on delivery failures.
const RESPONSE_SNIPPET_LEN: usize = 200;

pub struct WebhookChannel {
    http: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

fn truncated(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, config: &NotificationConfig, event: &Event) -> DeliveryResult {
        let webhook = &config.webhook;
        if webhook.url.is_empty() {
            return DeliveryResult::Failed {
                error: "webhook URL is not configured".to_string(),
            };
        }

        let body = super::render_template(&webhook.body_template, &template_vars(event));
        let method = Method::from_bytes(webhook.method.to_uppercase().as_bytes())
            .unwrap_or(Method::POST);

        let mut request = self
            .http
            .request(method, &webhook.url)
            .timeout(Duration::from_secs(SEND_TIMEOUT_SECS))
            .header("Content-Type", &webhook.content_type);
        for (name, value) in &webhook.headers {
            request = request.header(name, value);
        }

        let response = match request.body(body).send().await {
            Ok(response) => response,
            Err(e) => {
                return DeliveryResult::Failed {
                    error: format!("webhook request failed: {e}"),
                }
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return DeliveryResult::Failed {
                error: format!("HTTP {}: {}", status, truncated(&body, RESPONSE_SNIPPET_LEN)),
            };
        }
        DeliveryResult::Sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::notification::{EventType, NotificationPayload};
    use chrono::Utc;
    use serde_json::Map;

    #[tokio::test]
    async fn test_missing_url_is_config_error() {
        let channel = WebhookChannel::new(reqwest::Client::new());
        let config = NotificationConfig::default();
        let event = Event {
            event_type: EventType::Test,
            payload: NotificationPayload {
                title: "t".to_string(),
                message: "m".to_string(),
                data: Map::new(),
            },
            timestamp: Utc::now(),
        };

        let result = channel.send(&config, &event).await;
        assert_eq!(
            result,
            DeliveryResult::Failed {
                error: "webhook URL is not configured".to_string()
            }
        );
    }

    #[test]
    fn test_truncated_is_char_safe() {
        assert_eq!(truncated("héllo", 2), "hé");
        assert_eq!(truncated("short", 200), "short");
    }
}
