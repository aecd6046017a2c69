//! Remote image classification client.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{CoreError, CoreResult};
use crate::media::MediaCapture;

/// Label (and optional confidence) returned for one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub label: String,
    pub confidence: Option<f64>,
}

impl ClassificationResult {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

#[derive(Debug, Deserialize)]
struct ClassificationDto {
    #[serde(alias = "label")]
    class: Option<String>,
    confidence: Option<f64>,
}

/// Validate a classifier response body.
pub fn parse_classification(body: &[u8]) -> CoreResult<ClassificationResult> {
    let dto: ClassificationDto = serde_json::from_slice(body)
        .map_err(|e| CoreError::MalformedResponse(format!("classifier body: {e}")))?;
    let label = dto
        .class
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .ok_or_else(|| CoreError::MalformedResponse("classifier returned no class".into()))?;
    if let Some(c) = dto.confidence {
        if !(0.0..=1.0).contains(&c) {
            return Err(CoreError::MalformedResponse(format!(
                "confidence {c} outside [0, 1]"
            )));
        }
    }
    Ok(ClassificationResult {
        label,
        confidence: dto.confidence,
    })
}

/// Uploads a capture and returns its classification. Implementations do not
/// retry.
#[async_trait]
pub trait ClassificationClient: Send + Sync {
    async fn classify(&self, capture: &MediaCapture) -> CoreResult<ClassificationResult>;
}

/// Multipart POST to a fixed endpoint.
#[derive(Debug, Clone)]
pub struct HttpClassifier {
    url: String,
    http: Client,
}

impl HttpClassifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(url, Client::new())
    }

    pub fn with_client(url: impl Into<String>, http: Client) -> Self {
        Self {
            url: url.into(),
            http,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ClassificationClient for HttpClassifier {
    async fn classify(&self, capture: &MediaCapture) -> CoreResult<ClassificationResult> {
        let bytes = capture.read().await?;
        let part = Part::bytes(bytes)
            .file_name(capture.filename().to_string())
            .mime_str(&capture.mime_type)
            .map_err(|e| CoreError::Validation(format!("invalid MIME type: {e}")))?;
        let form = Form::new().part("file", part);

        debug!(url = %self.url, uri = %capture.uri, "classifier upload");
        let response = self
            .http
            .post(&self.url)
            .header("Accept", "application/json")
            .multipart(form)
            .send()
            .await
            .map_err(|e| CoreError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| CoreError::Network(e.to_string()))?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "classifier rejected upload");
            return Err(CoreError::Server {
                status: status.as_u16(),
                reason: reason_text(status, &body),
            });
        }

        let result = parse_classification(&body)?;
        info!(label = %result.label, "image classified");
        Ok(result)
    }
}

fn reason_text(status: StatusCode, body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body).trim().to_string();
    if text.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("unknown status")
            .to_string()
    } else {
        text
    }
}
