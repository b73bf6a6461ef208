/// Image ingestion: the shared `create_image` backend and the strictly
/// serial batch URL front-end with its progress stream.
use crate::config::Config;
use crate::db::{ImageRepo, SettingsRepo};
use crate::error::{AppError, Result};
use crate::models::{ImageRecord, ImageSummary};
use crate::services::moderation::ModerationQueue;
use crate::services::notification::{DeliveryResult, Dispatcher};
use crate::storage::ImageStorage;
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Delay between batch items, to avoid tripping anti-abuse measures on
/// the source hosts.
const INTER_ITEM_DELAY_MS: u64 = 100;

/// Downloaded response body plus its declared content type.
pub struct FetchedBody {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Seam for the actual download, so the serial batch logic is testable
/// without a network.
#[async_trait]
pub trait UrlFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> std::result::Result<FetchedBody, String>;
}

/// reqwest-backed fetcher with a bounded timeout and browser-like
/// headers (some hosts reject hotlink-style requests outright).
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl UrlFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> std::result::Result<FetchedBody, String> {
        let parsed = reqwest::Url::parse(url).map_err(|_| "invalid URL format".to_string())?;
        let origin = format!(
            "{}://{}",
            parsed.scheme(),
            parsed.host_str().unwrap_or_default()
        );

        let response = self
            .client
            .get(parsed)
            .timeout(self.timeout)
            .header(
                "User-Agent",
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            )
            .header(
                "Accept",
                "image/avif,image/webp,image/apng,image/svg+xml,image/*,*/*;q=0.8",
            )
            .header("Referer", format!("{origin}/"))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    "download timed out".to_string()
                } else {
                    format!("could not download image: {e}")
                }
            })?;

        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()));
        }
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| format!("could not read image body: {e}"))?;
        Ok(FetchedBody {
            content_type,
            bytes: bytes.to_vec(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Success,
    Error,
}

/// Per-URL record in the final batch summary, in input order.
#[derive(Debug, Clone, Serialize)]
pub struct BatchItemOutcome {
    pub url: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ImageSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Progress stream events pushed to the batch caller.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Start {
        total: usize,
    },
    Progress {
        index: usize,
        total: usize,
        url: String,
        status: ItemStatus,
        data: Option<ImageSummary>,
        error: Option<String>,
    },
    Complete {
        total: usize,
        success_count: usize,
        fail_count: usize,
        results: Vec<BatchItemOutcome>,
    },
    Error {
        error: String,
    },
}

impl ProgressEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            ProgressEvent::Start { .. } => "start",
            ProgressEvent::Progress { .. } => "progress",
            ProgressEvent::Complete { .. } => "complete",
            ProgressEvent::Error { .. } => "error",
        }
    }

    pub fn data_json(&self) -> Value {
        match self {
            ProgressEvent::Start { total } => json!({ "total": total }),
            ProgressEvent::Progress {
                index,
                total,
                url,
                status,
                data,
                error,
            } => {
                let mut body = json!({
                    "index": index,
                    "total": total,
                    "url": url,
                    "status": status,
                });
                if let Some(data) = data {
                    body["data"] = json!(data);
                }
                if let Some(error) = error {
                    body["error"] = json!(error);
                }
                body
            }
            ProgressEvent::Complete {
                total,
                success_count,
                fail_count,
                results,
            } => json!({
                "total": total,
                "success_count": success_count,
                "fail_count": fail_count,
                "results": results,
            }),
            ProgressEvent::Error { error } => json!({ "error": error }),
        }
    }

    /// Wire encoding for the server-sent event stream.
    pub fn to_sse(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.event_name(), self.data_json())
    }
}

/// Trim blanks and enforce batch bounds before any download starts.
pub fn validate_batch(urls: &[String], max_urls: usize) -> Result<Vec<String>> {
    let trimmed: Vec<String> = urls
        .iter()
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .collect();
    if trimmed.is_empty() {
        return Err(AppError::Validation(
            "at least one image URL is required".to_string(),
        ));
    }
    if trimmed.len() > max_urls {
        return Err(AppError::Validation(format!(
            "a batch may contain at most {max_urls} URLs"
        )));
    }
    Ok(trimmed)
}

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub max_urls: usize,
    pub max_file_size: u64,
    pub convert_to_webp: bool,
    pub public_base_url: String,
    pub inter_item_delay: Duration,
}

impl IngestOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_urls: config.batch_max_urls,
            max_file_size: config.max_file_size,
            convert_to_webp: config.convert_to_webp,
            public_base_url: config.public_base_url.clone(),
            inter_item_delay: Duration::from_millis(INTER_ITEM_DELAY_MS),
        }
    }
}

enum ItemError {
    /// Failure scoped to one URL; the batch continues.
    Item(String),
    /// Store-level failure; the batch cannot meaningfully continue.
    Fatal(AppError),
}

pub struct IngestService {
    images: ImageRepo,
    storage: Arc<ImageStorage>,
    settings: SettingsRepo,
    queue: Arc<ModerationQueue>,
    dispatcher: Arc<Dispatcher>,
    fetcher: Arc<dyn UrlFetcher>,
    options: IngestOptions,
}

impl IngestService {
    pub fn new(
        images: ImageRepo,
        storage: Arc<ImageStorage>,
        settings: SettingsRepo,
        queue: Arc<ModerationQueue>,
        dispatcher: Arc<Dispatcher>,
        fetcher: Arc<dyn UrlFetcher>,
        options: IngestOptions,
    ) -> Arc<Self> {
        Arc::new(Self {
            images,
            storage,
            settings,
            queue,
            dispatcher,
            fetcher,
            options,
        })
    }

    pub fn max_urls(&self) -> usize {
        self.options.max_urls
    }

    /// Shared ingestion backend: persist the bytes and record, fire the
    /// upload notification, and enqueue moderation when it is enabled.
    pub async fn create_image(
        &self,
        bytes: Vec<u8>,
        format: &str,
        original_name: String,
        uploaded_by: &str,
        source_url: Option<&str>,
    ) -> Result<ImageRecord> {
        let image_uuid = Uuid::new_v4().to_string();

        // Optional WebP transcode; GIFs keep their animation.
        let (bytes, format, is_webp) = if self.options.convert_to_webp && format != "gif" {
            match transcode_to_webp(&bytes) {
                Ok(converted) => (converted, "webp".to_string(), true),
                Err(e) => {
                    warn!(error = %e, "WebP transcode failed, keeping original format");
                    (bytes, format.to_string(), false)
                }
            }
        } else {
            (bytes, format.to_string(), false)
        };

        let (width, height) = image_dimensions(&bytes);
        let filename = format!("{image_uuid}.{format}");
        self.storage.save_file(&bytes, &filename).await?;

        let now = Utc::now();
        let record = ImageRecord {
            id: Uuid::new_v4().to_string(),
            uuid: image_uuid,
            original_name,
            filename,
            format,
            size: bytes.len() as u64,
            width,
            height,
            is_webp,
            is_deleted: false,
            uploaded_by: uploaded_by.to_string(),
            uploaded_via: "url".to_string(),
            source_url: source_url.map(str::to_string),
            uploaded_at: now,
            updated_at: now,
        };
        self.images.insert(&record).await?;
        info!(image_id = %record.id, filename = %record.filename, "image ingested");

        // Moderation is opted in at ingestion time: no task exists for
        // images uploaded while moderation is disabled.
        match self.settings.content_safety_config().await {
            Ok(config) if config.enabled => {
                if let Err(e) = self.queue.enqueue(&record).await {
                    warn!(image_id = %record.id, "could not enqueue moderation task: {e}");
                }
            }
            Ok(_) => {}
            Err(e) => warn!("could not load moderation settings: {e}"),
        }

        // Notify, don't transact.
        let url = record.public_url(&self.options.public_base_url);
        if let DeliveryResult::Failed { error } = self.dispatcher.notify_upload(&record, &url).await
        {
            warn!(image_id = %record.id, error = %error, "upload notification failed");
        }

        Ok(record)
    }

    async fn ingest_url(
        &self,
        url: &str,
        uploaded_by: &str,
    ) -> std::result::Result<ImageSummary, ItemError> {
        let parsed = reqwest::Url::parse(url).map_err(|_| ItemError::Item(
            "invalid URL format".to_string(),
        ))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ItemError::Item("unsupported URL scheme".to_string()));
        }

        let body = self
            .fetcher
            .fetch(parsed.as_str())
            .await
            .map_err(ItemError::Item)?;

        if !body.content_type.starts_with("image/") {
            return Err(ItemError::Item(
                "URL does not point to an image".to_string(),
            ));
        }
        if body.bytes.len() as u64 > self.options.max_file_size {
            return Err(ItemError::Item(format!(
                "image exceeds the size limit ({} MB)",
                self.options.max_file_size / (1024 * 1024)
            )));
        }

        let ext = extension_for(&parsed, &body.content_type);
        let original_name = original_name_for(&parsed, &ext);

        let record = self
            .create_image(body.bytes, &ext, original_name, uploaded_by, Some(url))
            .await
            .map_err(ItemError::Fatal)?;
        Ok(ImageSummary::from(&record))
    }

    /// Process a validated batch strictly serially, pushing one progress
    /// event per item as soon as its outcome is known. A closed receiver
    /// only stops the progress stream, not the ingestion itself.
    pub async fn run_batch(
        &self,
        urls: Vec<String>,
        uploaded_by: &str,
        tx: mpsc::Sender<ProgressEvent>,
    ) -> Vec<BatchItemOutcome> {
        let total = urls.len();
        emit(&tx, ProgressEvent::Start { total }).await;

        let mut results: Vec<BatchItemOutcome> = Vec::with_capacity(total);
        let mut success_count = 0;
        let mut fail_count = 0;

        for (i, url) in urls.iter().enumerate() {
            let index = i + 1;
            match self.ingest_url(url, uploaded_by).await {
                Ok(summary) => {
                    success_count += 1;
                    results.push(BatchItemOutcome {
                        url: url.clone(),
                        success: true,
                        data: Some(summary.clone()),
                        error: None,
                    });
                    emit(
                        &tx,
                        ProgressEvent::Progress {
                            index,
                            total,
                            url: url.clone(),
                            status: ItemStatus::Success,
                            data: Some(summary),
                            error: None,
                        },
                    )
                    .await;
                }
                Err(ItemError::Item(message)) => {
                    fail_count += 1;
                    results.push(BatchItemOutcome {
                        url: url.clone(),
                        success: false,
                        data: None,
                        error: Some(message.clone()),
                    });
                    emit(
                        &tx,
                        ProgressEvent::Progress {
                            index,
                            total,
                            url: url.clone(),
                            status: ItemStatus::Error,
                            data: None,
                            error: Some(message),
                        },
                    )
                    .await;
                }
                Err(ItemError::Fatal(e)) => {
                    tracing::error!(error = %e, "batch ingestion aborted by store failure");
                    emit(
                        &tx,
                        ProgressEvent::Error {
                            error: e.to_string(),
                        },
                    )
                    .await;
                    return results;
                }
            }

            if index < total {
                tokio::time::sleep(self.options.inter_item_delay).await;
            }
        }

        emit(
            &tx,
            ProgressEvent::Complete {
                total,
                success_count,
                fail_count,
                results: results.clone(),
            },
        )
        .await;
        results
    }
}

async fn emit(tx: &mpsc::Sender<ProgressEvent>, event: ProgressEvent) {
    // The caller may have closed the connection; further writes are
    // simply dropped.
    let _ = tx.send(event).await;
}

fn transcode_to_webp(bytes: &[u8]) -> std::result::Result<Vec<u8>, String> {
    let img = image::load_from_memory(bytes).map_err(|e| e.to_string())?;
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), image::ImageFormat::WebP)
        .map_err(|e| e.to_string())?;
    Ok(out)
}

fn image_dimensions(bytes: &[u8]) -> (u32, u32) {
    match image::load_from_memory(bytes) {
        Ok(img) => (img.width(), img.height()),
        // Formats the decoder cannot read (e.g. SVG) keep zero dimensions.
        Err(_) => (0, 0),
    }
}

/// File extension from the URL path, falling back to the content type.
fn extension_for(url: &reqwest::Url, content_type: &str) -> String {
    let path = url.path().to_ascii_lowercase();
    if let Some((_, ext)) = path.rsplit_once('.') {
        if !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return ext.to_string();
        }
    }
    match content_type {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/avif" => "avif",
        "image/svg+xml" => "svg",
        "image/bmp" => "bmp",
        "image/x-icon" => "ico",
        "image/apng" => "apng",
        "image/tiff" => "tiff",
        _ => "jpg",
    }
    .to_string()
}

fn original_name_for(url: &reqwest::Url, ext: &str) -> String {
    let name = url
        .path_segments()
        .and_then(|segments| segments.last())
        .filter(|s| !s.is_empty())
        .unwrap_or("image")
        .to_string();
    if name.contains('.') {
        name
    } else {
        format!("{name}.{ext}")
    }
}
