//! OCR provider abstraction.
//!
//! The handler only depends on [`OcrProvider`]; the Cloud Vision backend is
//! constructed once at startup and shared behind an `Arc`.

pub mod vision;

pub use vision::VisionProvider;

/// Async trait implemented by each OCR backend.
#[async_trait::async_trait]
pub trait OcrProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Full recognized text of the image, or an empty string if nothing was detected.
    async fn detect_text(&self, image: &[u8]) -> anyhow::Result<String>;
}
