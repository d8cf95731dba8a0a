use anyhow::Result;
use log::error;
use tesseract::Tesseract;

/// Extract text from an invoice image. Best effort: any Tesseract failure
/// yields an empty string so the upload pipeline can proceed with sentinel
/// fields instead of aborting.
pub fn extract_text(image_path: &str) -> String {
    match try_extract(image_path) {
        Ok(text) => text,
        Err(e) => {
            error!("OCR extraction failed for {}: {}", image_path, e);
            String::new()
        }
    }
}

fn try_extract(image_path: &str) -> Result<String> {
    let text = Tesseract::new(None, Some("eng"))?
        .set_image(image_path)?
        .get_text()?;
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_empty_text() {
        let text = extract_text("/nonexistent/invoice.png");
        assert_eq!(text, "");
    }
}
