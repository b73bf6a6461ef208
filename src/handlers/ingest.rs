/// Batch URL upload endpoint with a server-sent-event progress stream.
use super::AppState;
use crate::error::Result;
use crate::services::ingest::{self, ProgressEvent};
use actix_web::{web, HttpResponse};
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Ingestion runs under the admin identity; end-user accounts are the
/// auth layer's concern and out of scope here.
const UPLOADER: &str = "admin";

#[derive(Debug, Deserialize)]
pub struct UrlUploadRequest {
    pub urls: Vec<String>,
}

/// `POST /api/upload/urls`
///
/// Validation failures surface as a JSON error response before any data
/// is sent; after that the connection carries SSE events only.
pub async fn upload_from_urls(
    state: web::Data<AppState>,
    body: web::Json<UrlUploadRequest>,
) -> Result<HttpResponse> {
    let urls = ingest::validate_batch(&body.urls, state.ingest.max_urls())?;

    let (tx, rx) = mpsc::channel::<ProgressEvent>(32);
    let ingest = state.ingest.clone();
    tokio::spawn(async move {
        ingest.run_batch(urls, UPLOADER, tx).await;
    });

    let stream = ReceiverStream::new(rx)
        .map(|event| Ok::<web::Bytes, actix_web::Error>(web::Bytes::from(event.to_sse())));

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .insert_header(("X-Accel-Buffering", "no"))
        .streaming(stream))
}
