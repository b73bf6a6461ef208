/// HTTP endpoints: batch ingestion, settings administration, the
/// moderation task list and health probes.
pub mod ingest;
pub mod settings;
pub mod tasks;

use crate::db::{SettingsRepo, TaskRepo};
use crate::services::{Dispatcher, IngestService};
use actix_web::{web, HttpResponse};
use std::sync::Arc;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub ingest: Arc<IngestService>,
    pub settings: SettingsRepo,
    pub dispatcher: Arc<Dispatcher>,
    pub tasks: TaskRepo,
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({"status": "ok"}))
}

async fn ready() -> HttpResponse {
    HttpResponse::Ok().finish()
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/ready", web::get().to(ready))
        .service(
            web::scope("/api")
                .route("/upload/urls", web::post().to(ingest::upload_from_urls))
                .service(
                    web::scope("/settings")
                        .route(
                            "/notifications",
                            web::get().to(settings::get_notification_config),
                        )
                        .route(
                            "/notifications",
                            web::put().to(settings::update_notification_config),
                        )
                        .route(
                            "/notifications/test",
                            web::post().to(settings::test_notification_channel),
                        )
                        .route(
                            "/moderation",
                            web::get().to(settings::get_moderation_config),
                        )
                        .route(
                            "/moderation",
                            web::put().to(settings::update_moderation_config),
                        ),
                )
                .service(
                    web::scope("/moderation")
                        .route("/providers", web::get().to(settings::list_providers))
                        .route("/tasks", web::get().to(tasks::list_tasks)),
                ),
        );
}
