//! Attachment validation: cheap checks before any network spend.
//!
//! Checks run from cheapest to most expensive: the declared size and the
//! file extension are known before the attachment is downloaded, so both
//! gates run first and reject without touching the file. The magic-byte and
//! trailer sniffs need the bytes and run after the download.
//!
//! The trailer check mirrors what PDF readers actually tolerate: a valid
//! document ends with `%%EOF`, but writers append junk after it often enough
//! that we accept the marker anywhere in the final kilobyte.

use crate::error::ConvertError;

/// How many trailing bytes to scan for the `%%EOF` / `startxref` markers.
const TRAILER_WINDOW: usize = 1024;

/// Validate the declared name and size before downloading the attachment.
pub fn check_attachment(name: &str, size: i64, max_size: i64) -> Result<(), ConvertError> {
    if size > max_size {
        return Err(ConvertError::TooLarge {
            size,
            limit: max_size,
        });
    }
    if !name.to_lowercase().ends_with(".pdf") {
        return Err(ConvertError::NotPdf {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Validate the downloaded bytes: `%PDF` magic and a sane trailer.
pub fn check_pdf_bytes(bytes: &[u8]) -> Result<(), ConvertError> {
    if bytes.len() < 4 || &bytes[..4] != b"%PDF" {
        let mut magic = [0u8; 4];
        let n = bytes.len().min(4);
        magic[..n].copy_from_slice(&bytes[..n]);
        return Err(ConvertError::BadMagic { magic });
    }

    let tail_start = bytes.len().saturating_sub(TRAILER_WINDOW);
    let tail = &bytes[tail_start..];
    let has_marker = contains(tail, b"%%EOF") || contains(tail, b"startxref");
    if !has_marker {
        return Err(ConvertError::Truncated);
    }
    Ok(())
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Replace characters that are unsafe in file names with underscores and
/// cap the length, preserving the extension.
pub fn sanitize_filename(name: &str) -> String {
    const INVALID: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
    let mut cleaned: String = name
        .chars()
        .map(|c| if INVALID.contains(&c) || c.is_control() { '_' } else { c })
        .collect();

    const MAX_LEN: usize = 100;
    if cleaned.chars().count() > MAX_LEN {
        let ext = cleaned
            .rfind('.')
            .map(|i| cleaned[i..].to_string())
            .unwrap_or_default();
        let stem_budget = MAX_LEN.saturating_sub(ext.chars().count());
        let stem: String = cleaned.chars().take(stem_budget).collect();
        cleaned = format!("{stem}{ext}");
    }
    cleaned
}

/// Derive the output workbook name from the source document name.
pub fn xlsx_name(pdf_name: &str) -> String {
    let sanitized = sanitize_filename(pdf_name);
    match sanitized.to_lowercase().strip_suffix(".pdf") {
        Some(_) => format!("{}.xlsx", &sanitized[..sanitized.len() - 4]),
        None => format!("{sanitized}.xlsx"),
    }
}
