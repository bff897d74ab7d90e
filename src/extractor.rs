//! Invoice extraction pipeline: OCR, prompt, generation, JSON recovery.

use crate::error::AppError;
use crate::generative::{build_prompt, TextGenerator};
use crate::ocr::OcrProvider;
use crate::schema::InvoiceRecord;
use anyhow::{Context, Result};
use regex::Regex;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

/// What to do when the model's answer holds no parseable JSON object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParseFailurePolicy {
    /// Answer with [`InvoiceRecord::fallback`] and HTTP 200.
    #[default]
    SubstituteFallback,
    /// Fail the request with HTTP 500.
    PropagateError,
}

impl FromStr for ParseFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "substitute_fallback" | "substitutefallback" | "fallback" => {
                Ok(Self::SubstituteFallback)
            }
            "propagate_error" | "propagateerror" | "error" => Ok(Self::PropagateError),
            other => Err(format!(
                "unknown parse failure policy '{}' (expected substitute_fallback or propagate_error)",
                other
            )),
        }
    }
}

/// Extraction pipeline orchestrator. Built once, shared read-only across requests.
pub struct Extractor {
    ocr: Arc<dyn OcrProvider>,
    generator: Arc<dyn TextGenerator>,
    policy: ParseFailurePolicy,
}

impl Extractor {
    pub fn new(
        ocr: Arc<dyn OcrProvider>,
        generator: Arc<dyn TextGenerator>,
        policy: ParseFailurePolicy,
    ) -> Self {
        Self {
            ocr,
            generator,
            policy,
        }
    }

    pub fn policy(&self) -> ParseFailurePolicy {
        self.policy
    }

    /// Run OCR then generation on the image. The two calls are strictly sequential.
    pub async fn extract(&self, image: &[u8]) -> Result<serde_json::Value, AppError> {
        let ocr_text = self
            .ocr
            .detect_text(image)
            .await
            .map_err(AppError::Collaborator)?;

        if ocr_text.is_empty() {
            warn!("{}: no text detected, continuing with empty OCR text", self.ocr.name());
        }
        debug!("OCR result ({} chars):\n{}", ocr_text.len(), ocr_text);

        let prompt = build_prompt(&ocr_text);
        let response = self
            .generator
            .generate(&prompt)
            .await
            .map_err(AppError::Collaborator)?;
        debug!("{} response:\n{}", self.generator.name(), response);

        match parse_model_json(&response) {
            Ok(value) => {
                info!("Parsed invoice JSON from {} response", self.generator.name());
                Ok(value)
            }
            Err(e) => match self.policy {
                ParseFailurePolicy::SubstituteFallback => {
                    warn!("{:#}; returning fallback invoice. Raw text: {}", e, response);
                    Ok(InvoiceRecord::fallback().to_json())
                }
                ParseFailurePolicy::PropagateError => Err(AppError::Extraction(e)),
            },
        }
    }
}

// ============================================================================
// JSON recovery from free-form model output
// ============================================================================

fn fence_open() -> &'static Regex {
    static FENCE_OPEN: OnceLock<Regex> = OnceLock::new();
    // Opening fence with an optional language tag (```json, ```JSON, ```).
    FENCE_OPEN.get_or_init(|| Regex::new(r"```[A-Za-z0-9_+.-]*").expect("valid fence regex"))
}

/// Content of the first fenced code block, or the text itself when there is none.
/// An unclosed fence runs to the end of the text.
fn strip_code_fence(text: &str) -> &str {
    let Some(open) = fence_open().find(text) else {
        return text;
    };
    let body = &text[open.end()..];
    match body.find("```") {
        Some(close) => &body[..close],
        None => body,
    }
}

/// Locate the JSON object candidate: first `{` to last `}` after fence stripping.
pub fn extract_json_candidate(text: &str) -> Option<&str> {
    let text = strip_code_fence(text.trim());
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// Parse the JSON object embedded in a model answer, verbatim.
pub fn parse_model_json(text: &str) -> Result<serde_json::Value> {
    let candidate = extract_json_candidate(text).context("No JSON found in response")?;
    serde_json::from_str(candidate).context(format!(
        "JSON decode error: {}",
        &candidate.chars().take(200).collect::<String>()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use crate::testing::{FakeGenerator, FakeOcr};

    #[test]
    fn test_candidate_from_json_fence() {
        let text = "```json\n{\"invoice_number\": \"7\"}\n```";
        assert_eq!(extract_json_candidate(text), Some("{\"invoice_number\": \"7\"}"));
    }

    #[test]
    fn test_candidate_from_bare_fence_and_other_tags() {
        assert_eq!(extract_json_candidate("```\n{\"a\": 1}\n```"), Some("{\"a\": 1}"));
        assert_eq!(extract_json_candidate("```JSON\n{\"a\": 1}```"), Some("{\"a\": 1}"));
        assert_eq!(extract_json_candidate("```{\"a\": 1}```"), Some("{\"a\": 1}"));
    }

    #[test]
    fn test_candidate_with_surrounding_prose() {
        let text = "Here is the data:\n{\"a\": {\"b\": 2}}\nHope this helps!";
        assert_eq!(extract_json_candidate(text), Some("{\"a\": {\"b\": 2}}"));
    }

    #[test]
    fn test_candidate_unclosed_fence() {
        assert_eq!(extract_json_candidate("```json\n{\"a\": 1}"), Some("{\"a\": 1}"));
    }

    #[test]
    fn test_candidate_missing_braces() {
        assert_eq!(extract_json_candidate("no json here"), None);
        assert_eq!(extract_json_candidate("only { opening"), None);
        assert_eq!(extract_json_candidate("} reversed {"), None);
    }

    #[test]
    fn test_parse_model_json_verbatim() {
        let original = json!({
            "invoice_number": "7",
            "date": "1.1.2024",
            "supplier": "ACME",
            "total_amount": "10,00 €",
            "items": [],
            "extra": {"kept": true}
        });
        let text = format!("```json\n{}\n```", serde_json::to_string_pretty(&original).unwrap());
        assert_eq!(parse_model_json(&text).unwrap(), original);
    }

    #[test]
    fn test_parse_model_json_errors() {
        let err = parse_model_json("I could not read the invoice.").unwrap_err();
        assert_eq!(err.to_string(), "No JSON found in response");

        let err = parse_model_json("{\"invoice_number\": \"7\",}").unwrap_err();
        assert!(err.to_string().starts_with("JSON decode error"));
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!(
            "substitute_fallback".parse::<ParseFailurePolicy>().unwrap(),
            ParseFailurePolicy::SubstituteFallback
        );
        assert_eq!(
            "PROPAGATE_ERROR".parse::<ParseFailurePolicy>().unwrap(),
            ParseFailurePolicy::PropagateError
        );
        assert!("retry".parse::<ParseFailurePolicy>().is_err());
    }

    #[tokio::test]
    async fn test_extract_passes_ocr_text_into_prompt() {
        let ocr = Arc::new(FakeOcr::returning("Invoice #7 Total: 10,00 €"));
        let generator = Arc::new(FakeGenerator::answering(
            "```json\n{\"invoice_number\":\"7\"}\n```",
        ));
        let extractor = Extractor::new(
            ocr.clone(),
            generator.clone(),
            ParseFailurePolicy::SubstituteFallback,
        );

        let value = extractor.extract(b"png-bytes").await.unwrap();
        assert_eq!(value, json!({"invoice_number": "7"}));
        assert_eq!(ocr.seen.lock().unwrap().as_slice(), &[b"png-bytes".to_vec()]);

        let prompts = generator.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Invoice #7 Total: 10,00 €"));
    }

    #[tokio::test]
    async fn test_extract_empty_ocr_text_continues() {
        let generator = Arc::new(FakeGenerator::answering("{\"invoice_number\":\"\"}"));
        let extractor = Extractor::new(
            Arc::new(FakeOcr::returning("")),
            generator.clone(),
            ParseFailurePolicy::SubstituteFallback,
        );

        let value = extractor.extract(b"blank").await.unwrap();
        assert_eq!(value["invoice_number"], "");
        assert_eq!(generator.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_extract_substitutes_fallback() {
        let extractor = Extractor::new(
            Arc::new(FakeOcr::returning("garbled")),
            Arc::new(FakeGenerator::answering("Sorry, I can't help with that.")),
            ParseFailurePolicy::SubstituteFallback,
        );

        let value = extractor.extract(b"img").await.unwrap();
        assert_eq!(value, InvoiceRecord::fallback().to_json());
        assert_eq!(value["invoice_number"], "143");
    }

    #[tokio::test]
    async fn test_extract_propagates_parse_error() {
        let extractor = Extractor::new(
            Arc::new(FakeOcr::returning("garbled")),
            Arc::new(FakeGenerator::answering("{not json}")),
            ParseFailurePolicy::PropagateError,
        );

        let err = extractor.extract(b"img").await.unwrap_err();
        assert!(matches!(err, AppError::Extraction(_)));
    }

    #[tokio::test]
    async fn test_extract_ocr_failure_skips_generation() {
        let generator = Arc::new(FakeGenerator::answering("{}"));
        let extractor = Extractor::new(
            Arc::new(FakeOcr::failing("Google Vision API error: Bad image data.")),
            generator.clone(),
            ParseFailurePolicy::SubstituteFallback,
        );

        let err = extractor.extract(b"img").await.unwrap_err();
        assert_eq!(err.to_string(), "Google Vision API error: Bad image data.");
        assert!(generator.prompts.lock().unwrap().is_empty());
    }
}
