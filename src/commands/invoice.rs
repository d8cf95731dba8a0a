use chrono::NaiveDate;
use colored::Colorize;
use log::warn;
use std::path::Path;

use crate::database::Database;
use crate::extract::{normalize_fields, FieldExtractor};
use crate::ocr;
use crate::providers::traits::CompletionProvider;
use crate::session::ChatSession;

/// Upload pipeline: OCR, LLM field extraction, normalization, embedding,
/// then persistence. The invoice insert is the one fatal step; the image
/// record is best-effort once a valid identifier exists.
pub async fn handle_upload(
    image_path: &str,
    provider: &(dyn CompletionProvider + Send + Sync),
    db: &Database,
    session: &mut ChatSession,
    reference_date: NaiveDate,
) -> Result<(), String> {
    let file_name = Path::new(image_path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| image_path.to_string());

    if !session.note_upload(&file_name) {
        println!("Invoice {} was already processed.", file_name.yellow());
        return Ok(());
    }

    println!("📄 Processing invoice: {}", file_name.bright_yellow());

    // OCR failure yields empty text and the pipeline proceeds; the
    // extraction then produces sentinel fields instead of aborting.
    let ocr_text = ocr::extract_text(image_path);

    process_upload(image_path, &ocr_text, provider, db, session, reference_date).await
}

pub(crate) async fn process_upload(
    image_path: &str,
    ocr_text: &str,
    provider: &(dyn CompletionProvider + Send + Sync),
    db: &Database,
    session: &mut ChatSession,
    reference_date: NaiveDate,
) -> Result<(), String> {
    let extractor = FieldExtractor::new(provider.clone_box(), reference_date);
    let raw = extractor
        .extract(ocr_text)
        .await
        .map_err(|e| format!("Field extraction failed: {}", e))?;
    let fields = normalize_fields(raw, reference_date);

    let embedding = provider
        .generate_embedding(&fields.canonical_text())
        .await
        .map_err(|e| format!("Failed to embed invoice: {}", e))?;

    // Fatal: without an identifier no secondary row may be written.
    let invoice_id = db
        .insert_invoice(fields.clone(), embedding)
        .await
        .map_err(|e| format!("Failed to save invoice: {}", e))?;

    session.set_current_invoice(invoice_id);

    if let Err(e) = db
        .insert_invoice_image(invoice_id, image_path.to_string(), ocr_text.to_string())
        .await
    {
        warn!("failed to record invoice image for {}: {}", invoice_id, e);
    }

    println!("{}", "Invoice stored successfully.".green());
    println!(
        "  {} {} | {} {} | {} {}",
        "Invoice:".cyan(),
        fields.invoice_number,
        "Customer:".cyan(),
        fields.customer,
        "Total:".cyan(),
        fields.total_amount
    );

    Ok(())
}
