/// Telegram bot channel. When the event carries a public image URL the
/// notification is sent as an inline photo with caption, falling back to
/// a text message with a link when Telegram cannot fetch the image.
use super::{
    display_value, image_url_from, is_image_url_key, DeliveryResult, Event, NotificationChannel,
    SEND_TIMEOUT_SECS,
};
use crate::models::NotificationConfig;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::warn;

pub struct TelegramChannel {
    http: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn call(&self, token: &str, method: &str, body: Value) -> Result<(), String> {
        let url = format!("https://api.telegram.org/bot{token}/{method}");
        let response = self
            .http
            .post(&url)
            .timeout(Duration::from_secs(SEND_TIMEOUT_SECS))
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("telegram request failed: {e}"))?;

        let status = response.status();
        let raw: Value = response
            .json()
            .await
            .map_err(|e| format!("malformed telegram response: {e}"))?;
        if raw.get("ok") == Some(&Value::Bool(true)) {
            return Ok(());
        }
        let description = raw
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        Err(format!("telegram API error ({status}): {description}"))
    }
}

/// Escape Telegram Markdown control characters in user-supplied text.
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if "_*[]()~`>#+-=|{}.!".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Telegram accepts numeric chat ids as integers and channel handles as
/// strings.
fn chat_id_value(raw: &str) -> Value {
    match raw.parse::<i64>() {
        Ok(n) => Value::from(n),
        Err(_) => Value::from(raw),
    }
}

/// Bulleted key-value appendix. The image URL fields are omitted when the
/// image itself is shown (or linked).
fn appendix(event: &Event, exclude_image_keys: bool) -> String {
    let entries: Vec<String> = event
        .payload
        .data
        .iter()
        .filter(|(key, _)| !(exclude_image_keys && is_image_url_key(key)))
        .map(|(key, value)| {
            format!("\n• {}: `{}`", key, escape_markdown(&display_value(value)))
        })
        .collect();
    if entries.is_empty() {
        String::new()
    } else {
        format!("\n\n*Details:*{}", entries.concat())
    }
}

fn base_text(event: &Event) -> String {
    format!(
        "*{}*\n{}",
        escape_markdown(&event.payload.title),
        escape_markdown(&event.payload.message)
    )
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn send(&self, config: &NotificationConfig, event: &Event) -> DeliveryResult {
        let telegram = &config.telegram;
        if telegram.token.is_empty() || telegram.chat_id.is_empty() {
            return DeliveryResult::Failed {
                error: "telegram token or chat id is not configured".to_string(),
            };
        }
        let chat_id = chat_id_value(&telegram.chat_id);

        let result = match image_url_from(&event.payload.data) {
            Some(image_url) => {
                let caption = format!("{}{}", base_text(event), appendix(event, true));
                let photo = self
                    .call(
                        &telegram.token,
                        "sendPhoto",
                        json!({
                            "chat_id": chat_id,
                            "photo": image_url,
                            "caption": caption,
                            "parse_mode": "Markdown",
                        }),
                    )
                    .await;
                match photo {
                    Ok(()) => Ok(()),
                    Err(photo_error) => {
                        // Telegram could not fetch or render the image;
                        // fall back to a text message with a link.
                        warn!(error = %photo_error, "sendPhoto failed, falling back to text");
                        let text = format!(
                            "{}\n\n🖼️ *Image:* [view]({}){}",
                            base_text(event),
                            image_url,
                            appendix(event, true)
                        );
                        self.call(
                            &telegram.token,
                            "sendMessage",
                            json!({
                                "chat_id": chat_id,
                                "text": text,
                                "parse_mode": "Markdown",
                            }),
                        )
                        .await
                    }
                }
            }
            None => {
                let text = format!("{}{}", base_text(event), appendix(event, false));
                self.call(
                    &telegram.token,
                    "sendMessage",
                    json!({
                        "chat_id": chat_id,
                        "text": text,
                        "parse_mode": "Markdown",
                    }),
                )
                .await
            }
        };

        match result {
            Ok(()) => DeliveryResult::Sent,
            Err(error) => DeliveryResult::Failed { error },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::notification::{EventType, NotificationPayload};
    use chrono::Utc;
    use serde_json::Map;

    fn event(data: Map<String, Value>) -> Event {
        Event {
            event_type: EventType::Upload,
            payload: NotificationPayload {
                title: "Hi *there*".to_string(),
                message: "msg".to_string(),
                data,
            },
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_escape_markdown() {
        assert_eq!(escape_markdown("a_b*c"), "a\\_b\\*c");
        assert_eq!(escape_markdown("plain"), "plain");
    }

    #[test]
    fn test_chat_id_value() {
        assert_eq!(chat_id_value("42"), Value::from(42));
        assert_eq!(chat_id_value("@channel"), Value::from("@channel"));
    }

    #[test]
    fn test_appendix_excludes_image_keys() {
        let mut data = Map::new();
        data.insert("url".to_string(), json!("https://x.example/a.png"));
        data.insert("size".to_string(), json!(42));
        let text = appendix(&event(data), true);
        assert!(text.contains("size"));
        assert!(!text.contains("x.example"));
    }

    #[tokio::test]
    async fn test_missing_credentials_is_config_error() {
        let channel = TelegramChannel::new(reqwest::Client::new());
        let config = NotificationConfig::default();
        let result = channel.send(&config, &event(Map::new())).await;
        assert!(matches!(result, DeliveryResult::Failed { .. }));
    }
}
