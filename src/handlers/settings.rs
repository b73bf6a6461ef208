/// Settings administration: notification and moderation configuration,
/// the provider catalog and channel connectivity tests.
use super::AppState;
use crate::error::{AppError, Result};
use crate::models::{ContentSafetyConfig, NotificationConfig};
use crate::services::moderation;
use actix_web::{web, HttpResponse};

pub async fn get_notification_config(state: web::Data<AppState>) -> Result<HttpResponse> {
    let config = state.settings.notification_config().await?;
    Ok(HttpResponse::Ok().json(config))
}

pub async fn update_notification_config(
    state: web::Data<AppState>,
    body: web::Json<NotificationConfig>,
) -> Result<HttpResponse> {
    let config = body.into_inner();
    state.settings.save_notification_config(&config).await?;
    Ok(HttpResponse::Ok().json(config))
}

/// Send a fixed test event through the candidate config's active channel
/// without saving anything. The delivery result is always 200: failure is
/// data, not an HTTP error.
pub async fn test_notification_channel(
    state: web::Data<AppState>,
    body: web::Json<NotificationConfig>,
) -> Result<HttpResponse> {
    let result = state.dispatcher.test_channel(&body).await;
    Ok(HttpResponse::Ok().json(result))
}

pub async fn get_moderation_config(state: web::Data<AppState>) -> Result<HttpResponse> {
    let config = state.settings.content_safety_config().await?;
    Ok(HttpResponse::Ok().json(config))
}

pub async fn update_moderation_config(
    state: web::Data<AppState>,
    body: web::Json<ContentSafetyConfig>,
) -> Result<HttpResponse> {
    let config = body.into_inner();
    if !moderation::is_known_provider(&config.provider) {
        return Err(AppError::Validation(format!(
            "unsupported detection provider: {}",
            config.provider
        )));
    }
    for (key, provider) in &config.providers {
        moderation::validate_provider_config(key, provider)?;
    }
    state.settings.save_content_safety_config(&config).await?;
    Ok(HttpResponse::Ok().json(config))
}

pub async fn list_providers() -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(moderation::provider_catalog()))
}
