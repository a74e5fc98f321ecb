//! HTTP client for the pose analysis service

use super::cache::ListCache;
use super::dedup::RequestDeduplicator;
use super::types::{
    ComparisonResult, DeleteResponse, FrameComparisonResult, ReferenceMetadata, ReferenceVideoList, UploadResult,
    UserVideoUpload, VideoRole,
};
use super::AnalysisService;
use crate::comparison::sanitize_non_finite;
use crate::config::AppConfig;
use crate::recorder::VideoAsset;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Errors talking to the analysis service. Carries strings only so a single
/// result can be handed to every caller sharing an in-flight request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("{0}")]
    Service(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Body of a request, kept cloneable so it can be fingerprinted and rebuilt
#[derive(Debug, Clone)]
enum RequestBody {
    Empty,
    Form(Vec<(&'static str, String)>),
    Upload {
        file_field: &'static str,
        file_name: String,
        media_type: String,
        bytes: Arc<[u8]>,
        fields: Vec<(&'static str, String)>,
    },
}

impl RequestBody {
    fn fingerprint(&self) -> String {
        match self {
            RequestBody::Empty => String::new(),
            RequestBody::Form(fields) => encode_fields(fields),
            RequestBody::Upload {
                file_field,
                file_name,
                bytes,
                fields,
                ..
            } => format!(
                "{}={}:{}:{}&{}",
                file_field,
                file_name,
                bytes.len(),
                blake3::hash(bytes).to_hex(),
                encode_fields(fields)
            ),
        }
    }
}

fn encode_fields(fields: &[(&'static str, String)]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

pub struct ApiClient {
    http: reqwest::Client,
    api_base: String,
    media_base: String,
    in_flight: RequestDeduplicator<ApiResult<Value>>,
    references: ListCache<ReferenceVideoList>,
}

impl ApiClient {
    pub fn new(config: &AppConfig) -> ApiResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            api_base: config.api_base_url.trim_end_matches('/').to_string(),
            media_base: config.media_base_url.trim_end_matches('/').to_string(),
            in_flight: RequestDeduplicator::new(),
            references: ListCache::new(config.list_cache_ttl()),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path)
    }

    /// Playback URL of an uploaded reference video
    pub fn reference_video_url(&self, video_id: &str) -> String {
        format!("{}/video/{}", self.media_base, urlencoding::encode(video_id))
    }

    /// URL of the pose-annotated video for one side of a comparison
    pub fn pose_video_url(&self, work_id: &str, role: VideoRole) -> String {
        self.endpoint(&format!("pose-video/{}/{}", urlencoding::encode(work_id), role.as_str()))
    }

    /// Reference library, served from cache while fresh
    pub async fn reference_videos(&self) -> ApiResult<ReferenceVideoList> {
        if let Some(cached) = self.references.get() {
            tracing::debug!("Reference list served from cache");
            return Ok(cached);
        }
        let value = self
            .send(Method::GET, self.endpoint("reference-videos"), RequestBody::Empty)
            .await?;
        let list: ReferenceVideoList = decode(value)?;
        self.references.put(list.clone());
        Ok(list)
    }

    /// Download a pose-annotated video
    pub async fn fetch_pose_video(&self, work_id: &str, role: VideoRole) -> ApiResult<Vec<u8>> {
        let url = self.pose_video_url(work_id, role);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(interpret_response(status, &body)
                .err()
                .unwrap_or(ApiError::Status {
                    status: status.as_u16(),
                    body,
                }));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        tracing::debug!("Fetched {} pose video for {} ({} bytes)", role.as_str(), work_id, bytes.len());
        Ok(bytes.to_vec())
    }

    async fn send(&self, method: Method, url: String, body: RequestBody) -> ApiResult<Value> {
        let key = format!("{} {} {}", method, url, body.fingerprint());
        let http = self.http.clone();
        self.in_flight
            .run(key, move || execute(http, method, url, body))
            .await
    }
}

async fn execute(http: reqwest::Client, method: Method, url: String, body: RequestBody) -> ApiResult<Value> {
    tracing::debug!("{} {}", method, url);
    let request = http.request(method.clone(), &url);
    let request = match body {
        RequestBody::Empty => request,
        RequestBody::Form(fields) => request.form(&fields),
        RequestBody::Upload {
            file_field,
            file_name,
            media_type,
            bytes,
            fields,
        } => {
            let part = Part::bytes(bytes.to_vec())
                .file_name(file_name)
                .mime_str(&media_type)
                .map_err(|e| ApiError::Transport(e.to_string()))?;
            let form = fields
                .into_iter()
                .fold(Form::new().part(file_field, part), |form, (k, v)| form.text(k, v));
            request.multipart(form)
        }
    };

    let response = request.send().await.map_err(|e| {
        tracing::warn!("{} {} failed: {}", method, url, e);
        ApiError::Transport(e.to_string())
    })?;
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| ApiError::Transport(e.to_string()))?;
    interpret_response(status, &text)
}

/// Turn a raw response into its JSON body, surfacing `success: false` bodies
/// and non-2xx statuses as errors.
fn interpret_response(status: StatusCode, text: &str) -> ApiResult<Value> {
    let parsed = serde_json::from_str::<Value>(&sanitize_non_finite(text));

    if let Ok(Value::Object(map)) = &parsed {
        if map.get("success") == Some(&Value::Bool(false)) {
            let message = map
                .get("error")
                .or_else(|| map.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("Request was rejected by the service");
            return Err(ApiError::Service(message.to_string()));
        }
    }

    if !status.is_success() {
        return Err(ApiError::Status {
            status: status.as_u16(),
            body: text.to_string(),
        });
    }

    parsed.map_err(|e| ApiError::Decode(e.to_string()))
}

fn decode<T: DeserializeOwned>(value: Value) -> ApiResult<T> {
    serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
}

fn upload_body(file_field: &'static str, asset: &VideoAsset, fields: Vec<(&'static str, String)>) -> RequestBody {
    RequestBody::Upload {
        file_field,
        file_name: asset.file_name(),
        media_type: asset.media_type().to_string(),
        bytes: asset.bytes(),
        fields,
    }
}

#[async_trait]
impl AnalysisService for ApiClient {
    async fn upload_user_video(&self, asset: &VideoAsset, reference_video_id: &str) -> ApiResult<UserVideoUpload> {
        tracing::info!("Uploading {} ({} bytes)", asset.file_name(), asset.size());
        let body = upload_body(
            "user_video",
            asset,
            vec![("reference_video_id", reference_video_id.to_string())],
        );
        let value = self
            .send(Method::POST, self.endpoint("upload-user-video"), body)
            .await?;
        decode(value)
    }

    async fn compare(&self, user_video_id: &str, reference_video_id: &str, threshold: f64) -> ApiResult<ComparisonResult> {
        tracing::info!("Comparing {} against {} (threshold {})", user_video_id, reference_video_id, threshold);
        let body = RequestBody::Form(vec![
            ("user_video_id", user_video_id.to_string()),
            ("reference_video_id", reference_video_id.to_string()),
            ("threshold", threshold.to_string()),
        ]);
        let value = self
            .send(Method::POST, self.endpoint("compare-uploaded-videos"), body)
            .await?;
        decode(value)
    }

    async fn frame_comparison(&self, work_id: &str) -> ApiResult<FrameComparisonResult> {
        let url = self.endpoint(&format!("frame-comparison/{}", urlencoding::encode(work_id)));
        let value = self.send(Method::GET, url, RequestBody::Empty).await?;
        decode(value)
    }

    async fn delete_user_video(&self, user_video_id: &str) -> ApiResult<()> {
        let url = self.endpoint(&format!("delete-user-video/{}", urlencoding::encode(user_video_id)));
        let value = self.send(Method::DELETE, url, RequestBody::Empty).await?;
        let response: DeleteResponse = decode(value)?;
        tracing::info!(
            "Deleted user video {}: {}",
            user_video_id,
            response.message.as_deref().unwrap_or("ok")
        );
        self.references.invalidate();
        Ok(())
    }

    async fn upload_reference(&self, asset: &VideoAsset, meta: &ReferenceMetadata) -> ApiResult<UploadResult> {
        let fields = [
            ("description", &meta.description),
            ("author", &meta.author),
            ("title", &meta.title),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.as_ref().map(|v| (k, v.clone())))
        .collect();

        tracing::info!("Sharing {} as a reference video", asset.file_name());
        let value = self
            .send(Method::POST, self.endpoint("upload-reference"), upload_body("video", asset, fields))
            .await;
        self.references.invalidate();
        let result: UploadResult = decode(value?)?;
        if let Some(warning) = &result.warning {
            tracing::warn!("Reference uploaded with warning: {}", warning);
        }
        Ok(result)
    }
}
