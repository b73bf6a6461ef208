/// Vendor detection adapters.
///
/// Each adapter normalizes one vendor protocol into `DetectionResult` and
/// never propagates errors: network, HTTP and parse failures all come
/// back as `success: false`.
use super::{mime_type, DetectionAdapter, DetectionResult, DETECT_TIMEOUT_SECS};
use crate::models::ProviderConfig;
use async_trait::async_trait;
use reqwest::multipart;
use serde_json::Value;
use std::time::Duration;

fn non_empty<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() {
        fallback
    } else {
        value
    }
}

fn image_part(image: &[u8], filename: &str) -> Result<multipart::Part, String> {
    multipart::Part::bytes(image.to_vec())
        .file_name(filename.to_string())
        .mime_str(mime_type(filename))
        .map_err(|e| format!("failed to build multipart body: {e}"))
}

/// nsfwdet.com: multipart form with an `X-API-Key` header; the response
/// carries a raw NSFW probability compared against the configured
/// threshold.
///
/// Response: `{ "code": 0, "result": { "normal": 0.96, "nsfw": 0.04 } }`
pub struct NsfwDetAdapter {
    http: reqwest::Client,
}

impl NsfwDetAdapter {
    pub const DEFAULT_API_URL: &'static str = "https://nsfwdet.com/api/v1/detect-nsfw";
    pub const DEFAULT_API_KEY: &'static str = "nsfw_2f7ab4f1d743d69ee242eec932b19671";
    pub const DEFAULT_THRESHOLD: f64 = 0.5;

    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn call(
        &self,
        image: &[u8],
        filename: &str,
        config: &ProviderConfig,
    ) -> Result<DetectionResult, String> {
        let api_url = non_empty(&config.api_url, Self::DEFAULT_API_URL);
        let api_key = non_empty(&config.api_key, Self::DEFAULT_API_KEY);
        let threshold = config.threshold.unwrap_or(Self::DEFAULT_THRESHOLD);

        let form = multipart::Form::new().part("image", image_part(image, filename)?);
        let mut request = self
            .http
            .post(api_url)
            .timeout(Duration::from_secs(DETECT_TIMEOUT_SECS))
            .multipart(form);
        if !api_key.is_empty() {
            request = request.header("X-API-Key", api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| format!("detection request failed: {e}"))?;
        if !response.status().is_success() {
            return Err(format!("API request failed: {}", response.status()));
        }

        let raw: Value = response
            .json()
            .await
            .map_err(|e| format!("malformed detection response: {e}"))?;
        if raw.get("code").and_then(Value::as_i64) != Some(0) {
            return Err(format!("API returned error: code={}", raw["code"]));
        }

        let score = raw
            .pointer("/result/nsfw")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        Ok(DetectionResult {
            success: true,
            is_nsfw: score >= threshold,
            score,
            threshold,
            error: None,
            raw_result: Some(raw),
        })
    }
}

#[async_trait]
impl DetectionAdapter for NsfwDetAdapter {
    fn name(&self) -> &'static str {
        "NSFW Detector"
    }

    async fn detect(
        &self,
        image: &[u8],
        filename: &str,
        config: &ProviderConfig,
    ) -> DetectionResult {
        match self.call(image, filename, config).await {
            Ok(result) => result,
            Err(error) => DetectionResult::failure(error),
        }
    }
}

/// elysiatools.com: two-step upload-then-analyze. The upload returns a
/// server-side file handle which the JSON analysis endpoint references.
/// The vendor's own `isSafe` flag drives the verdict.
pub struct ElysiaToolsAdapter {
    http: reqwest::Client,
}

impl ElysiaToolsAdapter {
    pub const DEFAULT_UPLOAD_URL: &'static str =
        "https://elysiatools.com/upload/nsfw-image-detector";
    pub const DEFAULT_API_URL: &'static str =
        "https://elysiatools.com/zh/api/tools/nsfw-image-detector";
    const SENSITIVITY: f64 = 0.5;

    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn call(
        &self,
        image: &[u8],
        filename: &str,
        config: &ProviderConfig,
    ) -> Result<DetectionResult, String> {
        let upload_url = non_empty(&config.upload_url, Self::DEFAULT_UPLOAD_URL);
        let api_url = non_empty(&config.api_url, Self::DEFAULT_API_URL);

        // Step one: upload the image to obtain a file handle.
        let form = multipart::Form::new().part("file", image_part(image, filename)?);
        let upload_response = self
            .http
            .post(upload_url)
            .timeout(Duration::from_secs(DETECT_TIMEOUT_SECS))
            .multipart(form)
            .send()
            .await
            .map_err(|e| format!("upload failed: {e}"))?;
        if !upload_response.status().is_success() {
            return Err(format!("upload failed: {}", upload_response.status()));
        }
        let upload_result: Value = upload_response
            .json()
            .await
            .map_err(|e| format!("malformed upload response: {e}"))?;
        let file_path = upload_result
            .get("filePath")
            .and_then(Value::as_str)
            .ok_or_else(|| "upload response is missing filePath".to_string())?;

        // Step two: analyze by file handle.
        let detect_response = self
            .http
            .post(api_url)
            .timeout(Duration::from_secs(DETECT_TIMEOUT_SECS))
            .json(&serde_json::json!({
                "imageFile": file_path,
                "sensitivity": Self::SENSITIVITY,
                "analysisMode": "auto",
            }))
            .send()
            .await
            .map_err(|e| format!("detection request failed: {e}"))?;
        if !detect_response.status().is_success() {
            return Err(format!("detection failed: {}", detect_response.status()));
        }

        let raw: Value = detect_response
            .json()
            .await
            .map_err(|e| format!("malformed detection response: {e}"))?;
        if raw.get("data").is_none() {
            return Err("unexpected detection response shape".to_string());
        }
        let is_safe = raw.pointer("/data/data/isSafe") == Some(&Value::Bool(true));
        let confidence = raw
            .pointer("/data/confidence")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);

        Ok(DetectionResult {
            success: true,
            is_nsfw: !is_safe,
            score: if is_safe {
                0.0
            } else {
                (100.0 - confidence) / 100.0
            },
            threshold: Self::SENSITIVITY,
            error: None,
            raw_result: Some(raw),
        })
    }
}

#[async_trait]
impl DetectionAdapter for ElysiaToolsAdapter {
    fn name(&self) -> &'static str {
        "Elysia Tools"
    }

    async fn detect(
        &self,
        image: &[u8],
        filename: &str,
        config: &ProviderConfig,
    ) -> DetectionResult {
        match self.call(image, filename, config).await {
            Ok(result) => result,
            Err(error) => DetectionResult::failure(error),
        }
    }
}

/// Self-hosted nsfw_detector deployment. Same shape as the threshold
/// vendor, but the endpoint is mandatory operator configuration; a
/// missing URL is a configuration error and is reported without any
/// network call.
///
/// Response: `{ "status": "success", "result": { "sfw": 0.001, "nsfw": 0.999 } }`
pub struct SelfHostedAdapter {
    http: reqwest::Client,
}

impl SelfHostedAdapter {
    pub const DEFAULT_THRESHOLD: f64 = 0.8;

    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn call(
        &self,
        image: &[u8],
        filename: &str,
        config: &ProviderConfig,
    ) -> Result<DetectionResult, String> {
        if config.api_url.is_empty() {
            return Err(
                "nsfw_detector endpoint is not configured; set it in moderation settings"
                    .to_string(),
            );
        }
        let threshold = config.threshold.unwrap_or(Self::DEFAULT_THRESHOLD);

        let form = multipart::Form::new().part("file", image_part(image, filename)?);
        let mut request = self
            .http
            .post(&config.api_url)
            .timeout(Duration::from_secs(DETECT_TIMEOUT_SECS))
            .header("Accept", "application/json, text/plain, */*")
            .multipart(form);
        if !config.api_key.is_empty() {
            request = request.bearer_auth(&config.api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| format!("detection request failed: {e}"))?;
        if !response.status().is_success() {
            return Err(format!("API request failed: {}", response.status()));
        }

        let raw: Value = response
            .json()
            .await
            .map_err(|e| format!("malformed detection response: {e}"))?;
        if raw.get("status").and_then(Value::as_str) != Some("success") {
            return Err(format!("API returned error: {raw}"));
        }

        let score = raw
            .pointer("/result/nsfw")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        Ok(DetectionResult {
            success: true,
            is_nsfw: score >= threshold,
            score,
            threshold,
            error: None,
            raw_result: Some(raw),
        })
    }
}

#[async_trait]
impl DetectionAdapter for SelfHostedAdapter {
    fn name(&self) -> &'static str {
        "nsfw_detector"
    }

    async fn detect(
        &self,
        image: &[u8],
        filename: &str,
        config: &ProviderConfig,
    ) -> DetectionResult {
        match self.call(image, filename, config).await {
            Ok(result) => result,
            Err(error) => DetectionResult::failure(error),
        }
    }
}
