use std::fs;
use std::path::Path;

use log::{debug, info, warn};
use mime_guess::from_path;
use pdf_extract::extract_text_by_pages;

use crate::error::IngestError;

/// One page of the ingested source document.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// 1-based page number.
    pub page: u32,
    /// Extracted text for this page.
    pub text: String,
    /// Name of the file the page came from.
    pub source: String,
}

/// Read the document at `path` into ordered per-page records, skipping pages
/// whose extracted text is empty or whitespace-only.
pub fn load_source<P: AsRef<Path>>(path: P) -> Result<Vec<SourceDocument>, IngestError> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(IngestError::NotFound(path.to_path_buf()));
    }

    let source = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document")
        .to_string();

    // Detect MIME type
    let mime_type = from_path(path).first_or_octet_stream().to_string();
    debug!("Detected MIME type: {}", mime_type);

    let pages: Vec<String> = match mime_type.as_str() {
        // PDF documents are read page by page so chunk metadata can carry
        // page provenance
        mime if mime.starts_with("application/pdf") => {
            info!("Processing PDF document: {}", path.display());
            extract_text_by_pages(path).map_err(|e| IngestError::Extraction {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
        }

        // Plain text documents become a single page
        mime if mime.starts_with("text/") => {
            info!("Processing text document: {}", path.display());
            let content = fs::read_to_string(path).map_err(|e| IngestError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;
            vec![content]
        }

        other => return Err(IngestError::UnsupportedFormat(other.to_string())),
    };

    let documents: Vec<SourceDocument> = pages
        .into_iter()
        .enumerate()
        .filter_map(|(idx, raw)| {
            // PDF extraction can sometimes include excessive whitespace
            let text = normalize_whitespace(&raw);
            if text.is_empty() {
                debug!("Skipping empty page {}", idx + 1);
                None
            } else {
                Some(SourceDocument {
                    page: idx as u32 + 1,
                    text,
                    source: source.clone(),
                })
            }
        })
        .collect();

    if documents.is_empty() {
        warn!("Extracted content is empty or contains only whitespace");
        return Err(IngestError::EmptyDocument(path.to_path_buf()));
    }

    info!("Loaded {} pages from {}", documents.len(), path.display());
    Ok(documents)
}

/// Normalize whitespace in text (remove multiple consecutive spaces, newlines, etc.)
fn normalize_whitespace(text: &str) -> String {
    // Replace multiple spaces with a single space
    let result = text.replace('\r', "");

    // Replace multiple consecutive newlines with double newlines (paragraph separator)
    let mut prev_char = ' ';
    let mut newline_count = 0;
    let mut normalized = String::with_capacity(result.len());

    for c in result.chars() {
        if c == '\n' {
            newline_count += 1;
        } else {
            if newline_count > 0 {
                // Add at most two newlines (paragraph break)
                if newline_count >= 2 {
                    normalized.push_str("\n\n");
                } else {
                    normalized.push('\n');
                }
                newline_count = 0;
            }

            // Don't add consecutive spaces
            if !(c == ' ' && prev_char == ' ') {
                normalized.push(c);
            }

            prev_char = c;
        }
    }

    // Handle trailing newlines
    if newline_count > 0 {
        if newline_count >= 2 {
            normalized.push_str("\n\n");
        } else {
            normalized.push('\n');
        }
    }

    normalized.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn text_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".txt")
            .tempfile()
            .expect("create temp file");
        file.write_all(content.as_bytes()).expect("write temp file");
        file
    }

    #[test]
    fn test_normalize_whitespace() {
        let text = "This  has   multiple    spaces.\n\n\nAnd multiple newlines.\r\nAnd Windows line endings.";
        let expected =
            "This has multiple spaces.\n\nAnd multiple newlines.\nAnd Windows line endings.";
        assert_eq!(normalize_whitespace(text), expected);
    }

    #[test]
    fn test_load_text_file_as_single_page() {
        let file = text_file("COMPANY #1: Google\nEASY QUESTIONS\nTwo Sum");

        let documents = load_source(file.path()).expect("load text file");
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].page, 1);
        assert!(documents[0].text.contains("Two Sum"));
        assert!(documents[0].source.ends_with(".txt"));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let result = load_source("/nonexistent/questions.pdf");
        assert!(matches!(result, Err(IngestError::NotFound(_))));
    }

    #[test]
    fn test_whitespace_only_file_has_no_readable_pages() {
        let file = text_file("   \n\n\t  \n");

        let result = load_source(file.path());
        assert!(matches!(result, Err(IngestError::EmptyDocument(_))));
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        let file = tempfile::Builder::new()
            .suffix(".bin")
            .tempfile()
            .expect("create temp file");

        let result = load_source(file.path());
        assert!(matches!(result, Err(IngestError::UnsupportedFormat(_))));
    }
}
