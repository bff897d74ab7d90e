//! Request and invoice data types.
//!
//! Every field of an [`InvoiceRecord`] is a free-form string: amounts and dates
//! keep whatever locale formatting the model copied from the document
//! (e.g. `"1 620,00 €"`).

use serde::{Deserialize, Serialize};

/// Body of `POST /process-invoice-ai`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoiceExtractionRequest {
    /// Base64 image, usually as a data URI (`data:image/png;base64,...`).
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
}

/// Structured extraction target describing one invoice.
///
/// Output only: parsed model answers are returned as raw JSON, so this type is
/// only ever serialized (the fallback record).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceRecord {
    pub invoice_number: String,
    pub date: String,
    pub supplier: String,
    pub total_amount: String,
    pub items: Vec<LineItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineItem {
    pub designation: String,
    pub quantity: String,
    pub unit_price: String,
    pub total_price: String,
}

impl LineItem {
    fn new(designation: &str, quantity: &str, unit_price: &str, total_price: &str) -> Self {
        Self {
            designation: designation.to_string(),
            quantity: quantity.to_string(),
            unit_price: unit_price.to_string(),
            total_price: total_price.to_string(),
        }
    }
}

impl InvoiceRecord {
    /// The example invoice shown to the model in the prompt, also returned when
    /// the model's answer cannot be parsed.
    pub fn fallback() -> Self {
        Self {
            invoice_number: "143".to_string(),
            date: "2.6.2021".to_string(),
            supplier: "Mon Entreprise 22, Avenue Voltaire 13000 Marseille".to_string(),
            total_amount: "1 620,00 €".to_string(),
            items: vec![
                LineItem::new("Main d'oeuvre", "5", "60,00 €", "360,00 €"),
                LineItem::new("Produit", "10", "105,00 €", "1 260,00 €"),
            ],
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
