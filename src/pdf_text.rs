// src/pdf_text.rs

use lopdf::Document;
use tracing::{info, warn};

/// Outcome of pulling the text layer out of a PDF.
#[derive(Debug)]
pub enum PdfText {
    /// The PDF has an extractable text layer.
    Extracted(String),
    /// Image-only pages — would need OCR, which is out of scope.
    Scanned,
    /// The bytes could not be read as a PDF.
    Broken(String),
}

/// Below this many non-whitespace characters the "text layer" is assumed
/// to be stray artifacts on an otherwise scanned report.
const MIN_TEXT_CHARS: usize = 40;

/// Extract the text layer from raw PDF bytes.
pub fn extract(pdf_bytes: &[u8]) -> PdfText {
    let doc = match Document::load_mem(pdf_bytes) {
        Ok(d) => d,
        Err(e) => return PdfText::Broken(format!("failed to parse PDF: {e}")),
    };

    if is_image_only(&doc) {
        info!("PDF structural check: image-only pages, no font resources");
        return PdfText::Scanned;
    }

    match pdf_extract::extract_text_from_mem(pdf_bytes) {
        Ok(text) => {
            let meaningful = text.chars().filter(|c| !c.is_whitespace()).count();
            if meaningful < MIN_TEXT_CHARS {
                info!(chars = meaningful, "Extracted text too short — treating as scanned");
                PdfText::Scanned
            } else {
                info!(chars = meaningful, "Text layer extracted");
                PdfText::Extracted(text)
            }
        }
        Err(e) => {
            warn!(error = %e, "pdf-extract failed — treating as scanned");
            PdfText::Scanned
        }
    }
}

/// Walk the page tree and check each page's `Resources` dictionary. A page
/// with XObject images but no fonts cannot carry a text layer; if every
/// page looks like that, the report was scanned.
fn is_image_only(doc: &Document) -> bool {
    let pages = doc.get_pages();
    if pages.is_empty() {
        return false; // undecidable, let extraction try
    }

    let mut pages_with_fonts = 0usize;
    let mut pages_with_images = 0usize;

    for object_id in pages.values() {
        let Some(page_dict) = doc
            .get_object(*object_id)
            .ok()
            .and_then(|o| o.as_dict().ok())
        else {
            continue;
        };
        if resource_entry_nonempty(doc, page_dict, b"Font") {
            pages_with_fonts += 1;
        }
        if resource_entry_nonempty(doc, page_dict, b"XObject") {
            pages_with_images += 1;
        }
    }

    info!(
        total_pages = pages.len(),
        with_fonts = pages_with_fonts,
        with_images = pages_with_images,
        "Page resource analysis"
    );

    pages_with_fonts == 0 && pages_with_images > 0
}

fn resource_entry_nonempty(doc: &Document, page_dict: &lopdf::Dictionary, key: &[u8]) -> bool {
    page_dict
        .get(b"Resources")
        .ok()
        .and_then(|r| doc.dereference(r).ok())
        .and_then(|(_, resolved)| resolved.as_dict().ok())
        .and_then(|res| res.get(key).ok())
        .and_then(|entry| doc.dereference(entry).ok())
        .and_then(|(_, resolved)| resolved.as_dict().ok())
        .is_some_and(|dict| !dict.is_empty())
}
