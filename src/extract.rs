//! Page text extraction for uploaded files.
//!
//! PDFs yield one string per page. Plain text and Markdown files are split
//! into pages on form feeds (`\x0c`), so a file without any is one page.
//! Unreadable, unsupported or unparseable files are input errors.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use conecta_core::models::DocumentSource;
use conecta_core::RagError;

/// Source label used when a path has no file name.
pub const UNKNOWN_SOURCE: &str = "desconhecido";

const FORM_FEED: char = '\x0c';

/// Read `path` and split it into page texts.
pub fn load_document(path: &Path) -> Result<DocumentSource, RagError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let bytes = std::fs::read(path)
        .map_err(|e| RagError::input(format!("cannot read {}: {}", path.display(), e)))?;
    let pages = extract_pages(&bytes, &extension)?;

    Ok(DocumentSource {
        file_ref: path.display().to_string(),
        source_label: source_label(path),
        pages,
    })
}

/// Split file contents into pages according to its (lowercase) extension.
pub fn extract_pages(bytes: &[u8], extension: &str) -> Result<Vec<String>, RagError> {
    match extension {
        "pdf" => extract_pdf_pages(bytes),
        "txt" | "md" | "markdown" => {
            let text = std::str::from_utf8(bytes)
                .map_err(|e| RagError::input(format!("text file is not valid UTF-8: {}", e)))?;
            Ok(text.split(FORM_FEED).map(str::to_string).collect())
        }
        "" => Err(RagError::input("file has no extension")),
        other => Err(RagError::input(format!("unsupported file type: .{}", other))),
    }
}

fn extract_pdf_pages(bytes: &[u8]) -> Result<Vec<String>, RagError> {
    // pdf-extract can panic on malformed font tables.
    let result = catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(bytes)
    }));
    match result {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(e)) => Err(RagError::input(format!("PDF extraction failed: {}", e))),
        Err(_) => Err(RagError::input("PDF extraction failed: malformed document")),
    }
}

pub fn source_label(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or(UNKNOWN_SOURCE)
        .to_string()
}
