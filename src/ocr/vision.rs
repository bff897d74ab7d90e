//! Google Cloud Vision OCR provider (`images:annotate`, TEXT_DETECTION).

use super::OcrProvider;
use crate::config::{VisionAuth, VisionConfig};
use crate::google_auth::{ServiceAccountAuth, CLOUD_VISION_SCOPE};
use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

enum Credentials {
    ServiceAccount(ServiceAccountAuth),
    ApiKey(String),
}

pub struct VisionProvider {
    endpoint: String,
    credentials: Credentials,
    client: reqwest::Client,
}

impl VisionProvider {
    pub fn new(config: &VisionConfig, client: reqwest::Client) -> Result<Self> {
        let credentials = match &config.auth {
            VisionAuth::ServiceAccount(path) => {
                let auth = ServiceAccountAuth::from_key_file(path, CLOUD_VISION_SCOPE)?;
                info!("Cloud Vision: using service account {}", auth.client_email());
                Credentials::ServiceAccount(auth)
            }
            VisionAuth::ApiKey(key) => {
                info!("Cloud Vision: using API key");
                Credentials::ApiKey(key.clone())
            }
        };

        Ok(Self {
            endpoint: config.endpoint.clone(),
            credentials,
            client,
        })
    }
}

// ── Vision API request/response types ───────────────────────────────────────

#[derive(Serialize)]
struct AnnotateRequest {
    requests: Vec<ImageRequest>,
}

#[derive(Serialize)]
struct ImageRequest {
    image: ImageContent,
    features: Vec<Feature>,
}

#[derive(Serialize)]
struct ImageContent {
    content: String,
}

#[derive(Serialize)]
struct Feature {
    #[serde(rename = "type")]
    feature_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<ImageResponse>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageResponse {
    #[serde(default)]
    text_annotations: Vec<EntityAnnotation>,
    #[serde(default)]
    full_text_annotation: Option<TextAnnotation>,
    #[serde(default)]
    error: Option<Status>,
}

#[derive(Debug, Deserialize)]
struct EntityAnnotation {
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct TextAnnotation {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct Status {
    #[serde(default)]
    message: String,
}

/// Pull the full-text annotation out of a single-image response.
///
/// The first `textAnnotations` entry spans the whole image; `fullTextAnnotation`
/// is used when it is absent.
fn text_from_response(response: ImageResponse) -> Result<String> {
    if let Some(status) = response.error.filter(|s| !s.message.is_empty()) {
        anyhow::bail!("Google Vision API error: {}", status.message);
    }

    if let Some(first) = response.text_annotations.into_iter().next() {
        return Ok(first.description);
    }

    Ok(response
        .full_text_annotation
        .map(|t| t.text)
        .unwrap_or_default())
}

// ── Provider implementation ─────────────────────────────────────────────────

#[async_trait::async_trait]
impl OcrProvider for VisionProvider {
    fn name(&self) -> &str {
        "google_vision"
    }

    async fn detect_text(&self, image: &[u8]) -> Result<String> {
        let body = AnnotateRequest {
            requests: vec![ImageRequest {
                image: ImageContent {
                    content: BASE64.encode(image),
                },
                features: vec![Feature {
                    feature_type: "TEXT_DETECTION",
                }],
            }],
        };

        info!("VisionProvider: annotating image ({} bytes)", image.len());

        let request = self.client.post(&self.endpoint).json(&body);
        let request = match &self.credentials {
            Credentials::ServiceAccount(auth) => {
                let token = auth
                    .access_token(&self.client)
                    .await
                    .context("Failed to obtain Cloud Vision access token")?;
                request.bearer_auth(token)
            }
            Credentials::ApiKey(key) => request.header("x-goog-api-key", key),
        };

        let resp = request
            .send()
            .await
            .map_err(|e| e.without_url())
            .context("Failed to send request to Cloud Vision")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Google Vision API error ({}): {}", status, text);
        }

        let annotated: AnnotateResponse = resp
            .json()
            .await
            .map_err(|e| e.without_url())
            .context("Failed to parse Cloud Vision response")?;

        let text = text_from_response(annotated.responses.into_iter().next().unwrap_or_default())?;
        debug!("VisionProvider: detected {} chars", text.len());
        Ok(text)
    }
}
