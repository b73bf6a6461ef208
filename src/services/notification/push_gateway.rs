/// Push-gateway channel (ServerChan-style): posts the title and a
/// rendered markdown body to a per-operator keyed endpoint.
use super::{
    display_value, image_url_from, is_image_url_key, DeliveryResult, Event, NotificationChannel,
    SEND_TIMEOUT_SECS,
};
use crate::models::NotificationConfig;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

pub struct PushGatewayChannel {
    http: reqwest::Client,
}

impl PushGatewayChannel {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

/// Markdown body: message, optional image embed, key-value appendix.
fn markdown_body(event: &Event) -> String {
    let mut body = event.payload.message.clone();

    let image_url = image_url_from(&event.payload.data);
    if let Some(url) = image_url {
        body.push_str(&format!("\n\n![preview]({url})"));
    }

    let entries: Vec<String> = event
        .payload
        .data
        .iter()
        .filter(|(key, _)| !(image_url.is_some() && is_image_url_key(key)))
        .map(|(key, value)| format!("\n- **{}**: {}", key, display_value(value)))
        .collect();
    if !entries.is_empty() {
        body.push_str("\n\n### Details\n");
        body.push_str(&entries.concat());
    }
    body
}

#[async_trait]
impl NotificationChannel for PushGatewayChannel {
    fn name(&self) -> &'static str {
        "push-gateway"
    }

    async fn send(&self, config: &NotificationConfig, event: &Event) -> DeliveryResult {
        let gateway = &config.push_gateway;
        if gateway.send_key.is_empty() {
            return DeliveryResult::Failed {
                error: "push gateway send key is not configured".to_string(),
            };
        }

        let url = format!(
            "{}/{}.send",
            gateway.endpoint.trim_end_matches('/'),
            gateway.send_key
        );
        let body = markdown_body(event);
        let form = [
            ("text", event.payload.title.as_str()),
            ("desp", body.as_str()),
        ];

        let response = match self
            .http
            .post(&url)
            .timeout(Duration::from_secs(SEND_TIMEOUT_SECS))
            .form(&form)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return DeliveryResult::Failed {
                    error: format!("push gateway request failed: {e}"),
                }
            }
        };

        let status = response.status();
        if !status.is_success() {
            return DeliveryResult::Failed {
                error: format!("push gateway returned HTTP {status}"),
            };
        }
        let raw: Value = match response.json().await {
            Ok(raw) => raw,
            Err(e) => {
                return DeliveryResult::Failed {
                    error: format!("malformed push gateway response: {e}"),
                }
            }
        };

        // The vendor reports errors through its own status code.
        if raw.get("code").and_then(Value::as_i64) != Some(0) {
            let message = raw
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("push gateway send failed");
            return DeliveryResult::Failed {
                error: message.to_string(),
            };
        }
        DeliveryResult::Sent
    }
}
