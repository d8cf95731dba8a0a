use anyhow::Result;
use chrono::NaiveDate;
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::providers::traits::CompletionProvider;

pub const REQUIRED_FIELDS: [&str; 6] = [
    "invoice_number",
    "invoice_date",
    "total_amount",
    "supplier",
    "customer",
    "items",
];

/// Input date formats accepted from the extraction model.
const INPUT_DATE_FORMATS: [&str; 2] = ["%d/%m/%Y", "%d-%m-%Y"];

/// The six display fields of an invoice. After [`normalize_fields`] every
/// field holds a real value or exactly "N/A" ("0" for the amount), never an
/// empty string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceFields {
    pub invoice_number: String,
    pub invoice_date: String,
    pub total_amount: String,
    pub supplier: String,
    pub customer: String,
    pub items: String,
}

impl InvoiceFields {
    /// Canonical rendering embedded at ingestion time.
    pub fn canonical_text(&self) -> String {
        format!(
            "Invoice Number: {}\nCustomer: {}\nSupplier: {}\nDate: {}\nItems: {}\nTotal Amount: {}",
            self.invoice_number,
            self.customer,
            self.supplier,
            self.invoice_date,
            self.items,
            self.total_amount
        )
    }
}

pub struct FieldExtractor {
    provider: Box<dyn CompletionProvider + Send + Sync>,
    reference_date: NaiveDate,
}

impl FieldExtractor {
    pub fn new(
        provider: Box<dyn CompletionProvider + Send + Sync>,
        reference_date: NaiveDate,
    ) -> Self {
        Self {
            provider,
            reference_date,
        }
    }

    /// Ask the model for the six fields. The raw reply is parsed
    /// defensively; anything unparseable collapses to an empty map and the
    /// caller's normalization fills in sentinels. Provider errors propagate.
    pub async fn extract(&self, ocr_text: &str) -> Result<Map<String, Value>> {
        let prompt = extraction_prompt(ocr_text, self.reference_date);
        let response = self.provider.complete(&prompt).await?;

        if response.trim().is_empty() {
            warn!("extraction model returned an empty response");
            return Ok(Map::new());
        }

        Ok(parse_json_object(&response))
    }
}

pub fn extraction_prompt(ocr_text: &str, reference_date: NaiveDate) -> String {
    format!(
        "You are an expert invoice extraction assistant. Given the OCR text below, \
         extract the following details and ensure each field has a valid value \
         (if not available, output \"N/A\"):\n\
         IMPORTANT: Today's date is {today}. DO NOT use the current system date or \
         your internal date. Always assume {today} is today.\n\
         - invoice_number\n\
         - invoice_date (in DD-MM-YYYY or DD/MM/YYYY format)\n\
         - total_amount\n\
         - supplier\n\
         - customer\n\
         - items (concatenate item descriptions separated by \" | \")\n\n\
         Return only a valid JSON object with exactly these keys in this format:\n\
         {{\"invoice_number\": \"<value>\", \"invoice_date\": \"<value>\", \
         \"total_amount\": \"<value>\", \"supplier\": \"<value>\", \
         \"customer\": \"<value>\", \"items\": \"<value>\"}}\n\
         Do not output any additional commentary.\n\n\
         OCR Text:\n{ocr}",
        today = reference_date.format("%d-%m-%Y"),
        ocr = ocr_text
    )
}

/// Parse the model's reply into a JSON object, tolerating code-fence
/// wrapping and preamble text before the first `{`. Returns an empty map on
/// any parse failure.
pub fn parse_json_object(raw: &str) -> Map<String, Value> {
    let mut response = raw.trim();

    if response.starts_with("```") && response.ends_with("```") {
        response = response.trim_matches('`').trim();
    }

    let response = match response.find('{') {
        Some(start) => &response[start..],
        None => {
            warn!("extraction response contained no JSON object");
            return Map::new();
        }
    };

    match serde_json::from_str::<Value>(response) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            warn!("extraction response was valid JSON but not an object");
            Map::new()
        }
        Err(e) => {
            warn!("failed to parse extraction response: {}", e);
            Map::new()
        }
    }
}

/// Force every required key to a usable value: "N/A" sentinels ("0" for the
/// amount) for anything missing or blank, and the invoice date re-rendered
/// as ISO with the ingestion date as last resort.
pub fn normalize_fields(raw: Map<String, Value>, ingestion_date: NaiveDate) -> InvoiceFields {
    let field = |key: &str| -> String {
        let value = raw
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim()
            .to_string();
        if value.is_empty() {
            if key == "total_amount" { "0" } else { "N/A" }.to_string()
        } else {
            value
        }
    };

    InvoiceFields {
        invoice_number: field("invoice_number"),
        invoice_date: normalize_date(&field("invoice_date"), ingestion_date),
        total_amount: field("total_amount"),
        supplier: field("supplier"),
        customer: field("customer"),
        items: field("items"),
    }
}

/// Reparse a day-first date ('/' or '-' separated) and re-render it as
/// YYYY-MM-DD. Unparseable input, including the "N/A" sentinel, falls back
/// to the ingestion date.
pub fn normalize_date(value: &str, ingestion_date: NaiveDate) -> String {
    if value != "N/A" {
        for format in INPUT_DATE_FORMATS {
            if let Ok(parsed) = NaiveDate::parse_from_str(value, format) {
                return parsed.format("%Y-%m-%d").to_string();
            }
        }
    }
    ingestion_date.format("%Y-%m-%d").to_string()
}
