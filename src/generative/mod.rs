//! Generative-text collaborator and the invoice extraction prompt.

pub mod gemini;

pub use gemini::GeminiClient;

/// Async trait implemented by each text-generation backend.
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    fn name(&self) -> &str;

    /// Send a prompt and return the model's raw free-form answer.
    async fn generate(&self, prompt: &str) -> anyhow::Result<String>;
}

const OCR_TEXT_PLACEHOLDER: &str = "{ocr_text}";

/// The example object doubles as the fallback record (see `InvoiceRecord::fallback`).
pub const INVOICE_EXTRACTION_PROMPT: &str = r#"
Analyze this invoice OCR text and extract structured data. Return ONLY valid JSON in this exact format:

{
  "invoice_number": "143",
  "date": "2.6.2021",
  "supplier": "Mon Entreprise 22, Avenue Voltaire 13000 Marseille",
  "total_amount": "1 620,00 €",
  "items": [
    {
      "designation": "Main d'oeuvre",
      "quantity": "5",
      "unit_price": "60,00 €",
      "total_price": "360,00 €"
    },
    {
      "designation": "Produit",
      "quantity": "10",
      "unit_price": "105,00 €",
      "total_price": "1 260,00 €"
    }
  ]
}

Extract from this OCR text:
{ocr_text}

Return only the JSON, no other text.
"#;

/// Substitute the OCR text into the extraction prompt.
pub fn build_prompt(ocr_text: &str) -> String {
    INVOICE_EXTRACTION_PROMPT.replace(OCR_TEXT_PLACEHOLDER, ocr_text)
}
