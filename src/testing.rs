//! In-process collaborator fakes for tests.

use crate::generative::TextGenerator;
use crate::ocr::OcrProvider;
use axum::{extract::Request, http::StatusCode, Router};
use std::sync::{Arc, Mutex};

pub struct FakeOcr {
    text: Result<String, String>,
    pub seen: Mutex<Vec<Vec<u8>>>,
}

impl FakeOcr {
    pub fn returning(text: &str) -> Self {
        Self {
            text: Ok(text.to_string()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            text: Err(message.to_string()),
            seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl OcrProvider for FakeOcr {
    fn name(&self) -> &str {
        "fake_ocr"
    }

    async fn detect_text(&self, image: &[u8]) -> anyhow::Result<String> {
        self.seen.lock().unwrap().push(image.to_vec());
        self.text.clone().map_err(|e| anyhow::anyhow!(e))
    }
}

pub struct FakeGenerator {
    answer: Result<String, String>,
    pub prompts: Mutex<Vec<String>>,
}

impl FakeGenerator {
    pub fn answering(answer: &str) -> Self {
        Self {
            answer: Ok(answer.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            answer: Err(message.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl TextGenerator for FakeGenerator {
    fn name(&self) -> &str {
        "fake_llm"
    }

    async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.answer.clone().map_err(|e| anyhow::anyhow!(e))
    }
}

/// What a [`StubServer`] saw of one incoming request.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub uri: String,
    pub api_key: Option<String>,
}

/// Local HTTP server answering every request with a canned status and body.
pub struct StubServer {
    pub base_url: String,
    pub requests: Arc<Mutex<Vec<SeenRequest>>>,
}

impl StubServer {
    pub async fn spawn(status: StatusCode, body: &'static str) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = requests.clone();

        let app = Router::new().fallback(move |req: Request| {
            let seen = seen.clone();
            async move {
                let api_key = req
                    .headers()
                    .get("x-goog-api-key")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                seen.lock().unwrap().push(SeenRequest {
                    uri: req.uri().to_string(),
                    api_key,
                });
                (status, body)
            }
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            requests,
        }
    }

    pub fn seen(&self) -> Vec<SeenRequest> {
        self.requests.lock().unwrap().clone()
    }
}
