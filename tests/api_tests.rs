//! HTTP surface tests: settings administration, the provider catalog and
//! the SSE batch-upload endpoint.
mod common;

use actix_web::{test, web, App};
use common::{png_bytes, queue_with, setup, StubDetector, StubFetcher, TestApp};
use pictor::handlers::{self, AppState};
use pictor::services::ingest::{IngestOptions, IngestService};
use std::sync::Arc;
use std::time::Duration;

const VALID_URL: &str = "https://img.example/one.png";

fn app_state(app: &TestApp) -> AppState {
    let queue = queue_with(app, StubDetector::flagging(0.9));
    let fetcher = Arc::new(StubFetcher::new().with(VALID_URL, "image/png", png_bytes()));
    let ingest = IngestService::new(
        app.images.clone(),
        app.storage.clone(),
        app.settings.clone(),
        queue,
        app.dispatcher.clone(),
        fetcher,
        IngestOptions {
            max_urls: 20,
            max_file_size: 100 * 1024 * 1024,
            convert_to_webp: false,
            public_base_url: String::new(),
            inter_item_delay: Duration::from_millis(1),
        },
    );
    AppState {
        ingest,
        settings: app.settings.clone(),
        dispatcher: app.dispatcher.clone(),
        tasks: app.tasks.clone(),
    }
}

macro_rules! init_app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state))
                .configure(handlers::configure),
        )
        .await
    };
}

#[actix_web::test]
async fn health_endpoints_respond() {
    let fixture = setup().await;
    let app = init_app!(app_state(&fixture));

    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert!(resp.status().is_success());
    let resp = test::call_service(&app, test::TestRequest::get().uri("/ready").to_request()).await;
    assert!(resp.status().is_success());
}

#[actix_web::test]
async fn provider_catalog_lists_the_closed_vendor_set() {
    let fixture = setup().await;
    let app = init_app!(app_state(&fixture));

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/moderation/providers")
            .to_request(),
    )
    .await;
    assert!(resp.status().is_success());
    let providers: serde_json::Value = test::read_body_json(resp).await;
    let keys: Vec<&str> = providers
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["key"].as_str().unwrap())
        .collect();
    assert_eq!(keys.len(), 3);
    assert!(keys.contains(&"nsfwdet"));
    assert!(keys.contains(&"elysiatools"));
    assert!(keys.contains(&"nsfw_detector"));
}

#[actix_web::test]
async fn notification_settings_round_trip() {
    let fixture = setup().await;
    let app = init_app!(app_state(&fixture));

    let mut config: serde_json::Value = test::read_body_json(
        test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/api/settings/notifications")
                .to_request(),
        )
        .await,
    )
    .await;
    assert_eq!(config["enabled"], false);

    config["enabled"] = serde_json::json!(true);
    config["method"] = serde_json::json!("telegram");
    config["telegram"] = serde_json::json!({"token": "t", "chat_id": "42"});
    let resp = test::call_service(
        &app,
        test::TestRequest::put()
            .uri("/api/settings/notifications")
            .set_json(&config)
            .to_request(),
    )
    .await;
    assert!(resp.status().is_success());

    let stored: serde_json::Value = test::read_body_json(
        test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/api/settings/notifications")
                .to_request(),
        )
        .await,
    )
    .await;
    assert_eq!(stored["enabled"], true);
    assert_eq!(stored["method"], "telegram");
    assert_eq!(stored["telegram"]["chat_id"], "42");
    // Untouched channel blocks keep their defaults.
    assert_eq!(stored["webhook"]["method"], "POST");
}

#[actix_web::test]
async fn moderation_settings_reject_unknown_provider_and_bad_threshold() {
    let fixture = setup().await;
    let app = init_app!(app_state(&fixture));

    let resp = test::call_service(
        &app,
        test::TestRequest::put()
            .uri("/api/settings/moderation")
            .set_json(serde_json::json!({"enabled": true, "provider": "acme"}))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 400);

    let resp = test::call_service(
        &app,
        test::TestRequest::put()
            .uri("/api/settings/moderation")
            .set_json(serde_json::json!({
                "enabled": true,
                "provider": "nsfwdet",
                "providers": {"nsfwdet": {"threshold": 1.7}}
            }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 400);

    let resp = test::call_service(
        &app,
        test::TestRequest::put()
            .uri("/api/settings/moderation")
            .set_json(serde_json::json!({
                "enabled": true,
                "provider": "nsfwdet",
                "providers": {"nsfwdet": {"threshold": 0.7}}
            }))
            .to_request(),
    )
    .await;
    assert!(resp.status().is_success());
}

#[actix_web::test]
async fn channel_test_reports_delivery_result_as_data() {
    let fixture = setup().await;
    let app = init_app!(app_state(&fixture));

    // Unconfigured webhook: a config error, reported in-band with 200.
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/settings/notifications/test")
            .set_json(serde_json::json!({"enabled": false, "method": "webhook"}))
            .to_request(),
    )
    .await;
    assert!(resp.status().is_success());
    let result: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(result["status"], "failed");
}

#[actix_web::test]
async fn batch_upload_rejects_oversized_batches_with_json_error() {
    let fixture = setup().await;
    let app = init_app!(app_state(&fixture));

    let urls: Vec<String> = (0..21).map(|i| format!("https://img.example/{i}.png")).collect();
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/upload/urls")
            .set_json(serde_json::json!({ "urls": urls }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "validation_error");
}

#[actix_web::test]
async fn batch_upload_streams_progress_events() {
    let fixture = setup().await;
    let app = init_app!(app_state(&fixture));

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/upload/urls")
            .set_json(serde_json::json!({"urls": [VALID_URL, "not a url"]}))
            .to_request(),
    )
    .await;
    assert!(resp.status().is_success());
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "text/event-stream"
    );

    let body = test::read_body(resp).await;
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("event: start"));
    assert_eq!(text.matches("event: progress").count(), 2);
    assert!(text.contains("event: complete"));
    assert!(text.contains("\"success_count\":1"));
    assert!(text.contains("\"fail_count\":1"));
}

#[actix_web::test]
async fn task_list_is_served_for_the_admin_surface() {
    let fixture = setup().await;
    common::enable_moderation(&fixture).await;
    let app = init_app!(app_state(&fixture));

    // Ingest one image through the API, which enqueues a task.
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/upload/urls")
            .set_json(serde_json::json!({"urls": [VALID_URL]}))
            .to_request(),
    )
    .await;
    let _ = test::read_body(resp).await;

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/moderation/tasks")
            .to_request(),
    )
    .await;
    assert!(resp.status().is_success());
    let tasks: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(tasks.as_array().unwrap().len(), 1);
    assert_eq!(tasks[0]["status"], "pending");
}
