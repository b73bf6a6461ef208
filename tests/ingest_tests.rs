//! Batch URL ingestion: serial processing, per-item outcomes, progress
//! stream shape and the moderation hand-off.
mod common;

use common::{enable_moderation, png_bytes, queue_with, setup, StubDetector, StubFetcher, TestApp};
use pictor::error::AppError;
use pictor::models::TaskStatus;
use pictor::services::ingest::{
    validate_batch, IngestOptions, IngestService, ItemStatus, ProgressEvent,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const VALID_ONE: &str = "https://img.example/one.png";
const VALID_TWO: &str = "https://img.example/two.png";

fn options() -> IngestOptions {
    IngestOptions {
        max_urls: 20,
        max_file_size: 100 * 1024 * 1024,
        convert_to_webp: false,
        public_base_url: String::new(),
        inter_item_delay: Duration::from_millis(1),
    }
}

fn stub_fetcher() -> Arc<StubFetcher> {
    Arc::new(
        StubFetcher::new()
            .with(VALID_ONE, "image/png", png_bytes())
            .with(VALID_TWO, "image/png", png_bytes()),
    )
}

fn service(app: &TestApp, fetcher: Arc<StubFetcher>, options: IngestOptions) -> Arc<IngestService> {
    let queue = queue_with(app, StubDetector::flagging(0.9));
    IngestService::new(
        app.images.clone(),
        app.storage.clone(),
        app.settings.clone(),
        queue,
        app.dispatcher.clone(),
        fetcher,
        options,
    )
}

async fn drain(mut rx: mpsc::Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn mixed_batch_reports_ordered_outcomes() {
    let app = setup().await;
    let fetcher = stub_fetcher();
    let service = service(&app, fetcher.clone(), options());

    let urls = vec![
        VALID_ONE.to_string(),
        "not a url".to_string(),
        VALID_TWO.to_string(),
    ];
    let (tx, rx) = mpsc::channel(64);
    let results = service.run_batch(urls.clone(), "admin", tx).await;
    let events = drain(rx).await;

    // start + one progress per item + complete.
    assert!(matches!(events[0], ProgressEvent::Start { total: 3 }));
    let progress: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, ProgressEvent::Progress { .. }))
        .collect();
    assert_eq!(progress.len(), 3);

    match events.last().unwrap() {
        ProgressEvent::Complete {
            total,
            success_count,
            fail_count,
            results: summary,
        } => {
            assert_eq!(*total, 3);
            assert_eq!(*success_count, 2);
            assert_eq!(*fail_count, 1);
            let order: Vec<_> = summary.iter().map(|r| r.url.as_str()).collect();
            assert_eq!(order, vec![VALID_ONE, "not a url", VALID_TWO]);
            assert!(summary[1].error.is_some());
            assert!(summary[0].data.as_ref().unwrap().url.starts_with("/i/"));
        }
        other => panic!("expected complete event, got {other:?}"),
    }

    // The malformed URL never reached the fetcher.
    assert_eq!(fetcher.calls(), 2);
    assert_eq!(results.len(), 3);
    assert_eq!(app.images.count().await.unwrap(), 2);
}

#[tokio::test]
async fn progress_events_carry_item_status() {
    let app = setup().await;
    let service = service(&app, stub_fetcher(), options());

    let (tx, rx) = mpsc::channel(64);
    service
        .run_batch(
            vec![VALID_ONE.to_string(), "ftp://img.example/a.png".to_string()],
            "admin",
            tx,
        )
        .await;

    let statuses: Vec<ItemStatus> = drain(rx)
        .await
        .into_iter()
        .filter_map(|e| match e {
            ProgressEvent::Progress { status, .. } => Some(status),
            _ => None,
        })
        .collect();
    assert_eq!(statuses, vec![ItemStatus::Success, ItemStatus::Error]);
}

#[test]
fn oversized_batch_is_rejected_before_any_download() {
    let urls: Vec<String> = (0..21).map(|i| format!("https://img.example/{i}.png")).collect();
    let err = validate_batch(&urls, 20).unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn non_image_content_type_is_a_per_item_error() {
    let app = setup().await;
    let fetcher = Arc::new(StubFetcher::new().with(
        VALID_ONE,
        "text/html",
        b"<html></html>".to_vec(),
    ));
    let service = service(&app, fetcher, options());

    let (tx, rx) = mpsc::channel(16);
    let results = service
        .run_batch(vec![VALID_ONE.to_string()], "admin", tx)
        .await;
    drain(rx).await;

    assert!(!results[0].success);
    assert!(results[0]
        .error
        .as_ref()
        .unwrap()
        .contains("does not point to an image"));
    assert_eq!(app.images.count().await.unwrap(), 0);
}

#[tokio::test]
async fn oversized_payload_is_a_per_item_error() {
    let app = setup().await;
    let mut opts = options();
    opts.max_file_size = 8;
    let service = service(&app, stub_fetcher(), opts);

    let (tx, rx) = mpsc::channel(16);
    let results = service
        .run_batch(vec![VALID_ONE.to_string()], "admin", tx)
        .await;
    drain(rx).await;

    assert!(!results[0].success);
    assert!(results[0].error.as_ref().unwrap().contains("size limit"));
    assert_eq!(app.images.count().await.unwrap(), 0);
}

#[tokio::test]
async fn successful_items_enqueue_moderation_when_enabled() {
    let app = setup().await;
    enable_moderation(&app).await;
    let service = service(&app, stub_fetcher(), options());

    let (tx, rx) = mpsc::channel(16);
    service
        .run_batch(
            vec![VALID_ONE.to_string(), VALID_TWO.to_string()],
            "admin",
            tx,
        )
        .await;
    drain(rx).await;

    assert_eq!(
        app.tasks.count_status(TaskStatus::Pending).await.unwrap(),
        2
    );
}

#[tokio::test]
async fn no_tasks_are_created_while_moderation_is_disabled() {
    let app = setup().await;
    let service = service(&app, stub_fetcher(), options());

    let (tx, rx) = mpsc::channel(16);
    service
        .run_batch(vec![VALID_ONE.to_string()], "admin", tx)
        .await;
    drain(rx).await;

    assert_eq!(app.tasks.list().await.unwrap().len(), 0);
}

#[tokio::test]
async fn closed_progress_stream_does_not_abort_ingestion() {
    let app = setup().await;
    let service = service(&app, stub_fetcher(), options());

    let (tx, rx) = mpsc::channel(16);
    drop(rx); // caller hung up before the batch started
    let results = service
        .run_batch(
            vec![VALID_ONE.to_string(), VALID_TWO.to_string()],
            "admin",
            tx,
        )
        .await;

    assert_eq!(results.iter().filter(|r| r.success).count(), 2);
    assert_eq!(app.images.count().await.unwrap(), 2);
}
