#![allow(dead_code)]

use async_trait::async_trait;
use pictor::db::{Database, ImageRepo, SettingsRepo, TaskRepo};
use pictor::models::{ContentSafetyConfig, ImageRecord};
use pictor::services::ingest::{FetchedBody, UrlFetcher};
use pictor::services::moderation::{DetectionResult, Detector, ModerationQueue};
use pictor::services::notification::Dispatcher;
use pictor::storage::ImageStorage;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

pub struct TestApp {
    // Held so the temp directory outlives the test.
    pub dir: TempDir,
    pub db: Arc<Database>,
    pub storage: Arc<ImageStorage>,
    pub tasks: TaskRepo,
    pub images: ImageRepo,
    pub settings: SettingsRepo,
    pub dispatcher: Arc<Dispatcher>,
}

pub async fn setup() -> TestApp {
    let dir = TempDir::new().expect("tempdir");
    let db = Database::open(&dir.path().join("db")).await.expect("open db");
    let storage = Arc::new(ImageStorage::new(dir.path().join("uploads")));
    let tasks = TaskRepo::new(&db);
    let images = ImageRepo::new(&db);
    let settings = SettingsRepo::new(&db);
    let dispatcher = Dispatcher::new(settings.clone());
    TestApp {
        dir,
        db,
        storage,
        tasks,
        images,
        settings,
        dispatcher,
    }
}

pub fn queue_with(app: &TestApp, detector: Arc<dyn Detector>) -> Arc<ModerationQueue> {
    ModerationQueue::new(
        app.tasks.clone(),
        app.images.clone(),
        app.settings.clone(),
        app.storage.clone(),
        detector,
        app.dispatcher.clone(),
        Duration::from_millis(10),
        String::new(),
    )
}

pub async fn enable_moderation(app: &TestApp) {
    let config = ContentSafetyConfig {
        enabled: true,
        ..ContentSafetyConfig::default()
    };
    app.settings
        .save_content_safety_config(&config)
        .await
        .expect("save moderation config");
}

/// A 2x2 PNG produced by the image crate.
pub fn png_bytes() -> Vec<u8> {
    let img = image::DynamicImage::new_rgb8(2, 2);
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
        .expect("encode png");
    out
}

/// Persist an image record plus its backing file.
pub async fn seed_image(app: &TestApp, with_file: bool) -> ImageRecord {
    let image_uuid = Uuid::new_v4().to_string();
    let filename = format!("{image_uuid}.png");
    if with_file {
        app.storage
            .save_file(&png_bytes(), &filename)
            .await
            .expect("save file");
    }
    let now = chrono::Utc::now();
    let record = ImageRecord {
        id: Uuid::new_v4().to_string(),
        uuid: image_uuid,
        original_name: "test.png".to_string(),
        filename,
        format: "png".to_string(),
        size: 68,
        width: 2,
        height: 2,
        is_webp: false,
        is_deleted: false,
        uploaded_by: "admin".to_string(),
        uploaded_via: "url".to_string(),
        source_url: None,
        uploaded_at: now,
        updated_at: now,
    };
    app.images.insert(&record).await.expect("insert image");
    record
}

/// Detector stub with a fixed outcome.
pub enum StubBehavior {
    Success { is_nsfw: bool, score: f64 },
    Failure(String),
}

pub struct StubDetector {
    behavior: StubBehavior,
    calls: AtomicUsize,
}

impl StubDetector {
    pub fn new(behavior: StubBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn flagging(score: f64) -> Arc<Self> {
        Self::new(StubBehavior::Success {
            is_nsfw: true,
            score,
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Self::new(StubBehavior::Failure(message.to_string()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Detector for StubDetector {
    async fn moderate(
        &self,
        _image: &[u8],
        _filename: &str,
        _config: &ContentSafetyConfig,
    ) -> DetectionResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            StubBehavior::Success { is_nsfw, score } => DetectionResult {
                success: true,
                is_nsfw: *is_nsfw,
                score: *score,
                threshold: 0.5,
                error: None,
                raw_result: None,
            },
            StubBehavior::Failure(message) => DetectionResult::failure(message.clone()),
        }
    }
}

/// Fetcher stub serving canned responses, counting every call.
pub struct StubFetcher {
    responses: HashMap<String, (String, Vec<u8>)>,
    calls: AtomicUsize,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with(mut self, url: &str, content_type: &str, bytes: Vec<u8>) -> Self {
        self.responses
            .insert(url.to_string(), (content_type.to_string(), bytes));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UrlFetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedBody, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.responses.get(url) {
            Some((content_type, bytes)) => Ok(FetchedBody {
                content_type: content_type.clone(),
                bytes: bytes.clone(),
            }),
            None => Err("HTTP 404 Not Found".to_string()),
        }
    }
}
