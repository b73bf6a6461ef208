/// Email channel: SMTP submission with a fixed HTML document template,
/// embedding the image inline when the event carries a public URL.
use super::{
    display_value, image_url_from, is_image_url_key, DeliveryResult, Event, NotificationChannel,
};
use crate::models::NotificationConfig;
use async_trait::async_trait;
use lettre::message::{header, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

pub struct EmailChannel;

impl EmailChannel {
    pub fn new() -> Self {
        Self
    }
}

impl Default for EmailChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Map nodemailer-style well-known service names to their SMTP relay
/// hosts; anything else is used as the relay hostname directly.
fn smtp_host(service: &str) -> String {
    match service.to_ascii_lowercase().as_str() {
        "gmail" => "smtp.gmail.com".to_string(),
        "qq" => "smtp.qq.com".to_string(),
        "163" => "smtp.163.com".to_string(),
        "outlook" => "smtp.office365.com".to_string(),
        other => other.to_string(),
    }
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Fixed outer document; `content` is the already-assembled body markup.
fn html_document(content: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <style>
    body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Arial, sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; padding: 20px; background-color: #f5f5f5; }}
    .container {{ background-color: #ffffff; border-radius: 8px; padding: 30px; box-shadow: 0 2px 4px rgba(0, 0, 0, 0.1); }}
    .header {{ border-bottom: 2px solid #007bff; padding-bottom: 15px; margin-bottom: 20px; }}
    .header h1 {{ margin: 0; color: #007bff; font-size: 24px; }}
    .content {{ padding: 10px 0; }}
    .footer {{ margin-top: 30px; padding-top: 15px; border-top: 1px solid #eee; font-size: 12px; color: #666; text-align: center; }}
    .info-item {{ padding: 8px 0; border-bottom: 1px solid #f0f0f0; }}
    .info-label {{ font-weight: 600; color: #555; }}
    .info-value {{ color: #333; }}
  </style>
</head>
<body>
  <div class="container">
    {content}
    <div class="footer">
      <p>Sent automatically by the Pictor image host</p>
    </div>
  </div>
</body>
</html>
"#
    )
}

fn build_content(event: &Event) -> String {
    let mut content = format!(
        r#"<div class="header"><h1>{}</h1></div>
<div class="content">
  <p>{}</p>
"#,
        html_escape(&event.payload.title),
        html_escape(&event.payload.message)
    );

    let image_url = image_url_from(&event.payload.data);
    if let Some(url) = image_url {
        content.push_str(&format!(
            r#"  <div style="margin-top: 20px; text-align: center;">
    <img src="{url}" alt="uploaded image" style="max-width: 100%; max-height: 400px; border-radius: 8px;" />
    <p style="margin-top: 10px; font-size: 12px;"><a href="{url}" target="_blank" style="color: #007bff;">View original</a></p>
  </div>
"#
        ));
    }

    let items: Vec<String> = event
        .payload
        .data
        .iter()
        .filter(|(key, _)| !(image_url.is_some() && is_image_url_key(key)))
        .map(|(key, value)| {
            format!(
                r#"    <div class="info-item"><span class="info-label">{}:</span> <span class="info-value">{}</span></div>
"#,
                html_escape(key),
                html_escape(&display_value(value))
            )
        })
        .collect();
    if !items.is_empty() {
        content.push_str("  <div style=\"margin-top: 20px;\"><h3>Details</h3>\n");
        content.push_str(&items.concat());
        content.push_str("  </div>\n");
    }

    content.push_str("</div>");
    content
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn send(&self, config: &NotificationConfig, event: &Event) -> DeliveryResult {
        let email = &config.email;
        if email.service.is_empty() || email.user.is_empty() || email.pass.is_empty() {
            return DeliveryResult::Failed {
                error: "email configuration is incomplete (service, user and pass are required)"
                    .to_string(),
            };
        }

        let from: Mailbox = match email.user.parse() {
            Ok(mailbox) => mailbox,
            Err(e) => {
                return DeliveryResult::Failed {
                    error: format!("invalid sender address: {e}"),
                }
            }
        };
        let to_address = if email.to.is_empty() {
            &email.user
        } else {
            &email.to
        };
        let to: Mailbox = match to_address.parse() {
            Ok(mailbox) => mailbox,
            Err(e) => {
                return DeliveryResult::Failed {
                    error: format!("invalid recipient address: {e}"),
                }
            }
        };

        let message = match Message::builder()
            .from(from)
            .to(to)
            .subject(format!("[Pictor] {}", event.payload.title))
            .header(header::ContentType::TEXT_HTML)
            .body(html_document(&build_content(event)))
        {
            Ok(message) => message,
            Err(e) => {
                return DeliveryResult::Failed {
                    error: format!("could not build email: {e}"),
                }
            }
        };

        let transport = match AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp_host(
            &email.service,
        )) {
            Ok(builder) => builder
                .credentials(Credentials::new(email.user.clone(), email.pass.clone()))
                .build(),
            Err(e) => {
                return DeliveryResult::Failed {
                    error: format!("could not configure SMTP transport: {e}"),
                }
            }
        };

        match transport.send(message).await {
            Ok(_) => DeliveryResult::Sent,
            Err(e) => DeliveryResult::Failed {
                error: format!("email delivery failed: {e}"),
            },
        }
    }
}
