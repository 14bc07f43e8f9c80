//! Upload validation for the recognition endpoint
//!
//! Rejections happen before any image decoding so that oversized or
//! unsupported uploads never reach the inference workers.

use anyhow::{anyhow, Result};
use std::path::Path;

// ============================================================================
// CONSTANTS: Upload Limits
// ============================================================================

/// Maximum accepted upload size (10 MiB)
pub const MAX_IMAGE_SIZE: usize = 10 * 1024 * 1024;

/// File extensions accepted by the recognition endpoint, lowercase with the dot
pub const ALLOWED_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".bmp"];

/// Maximum length for uploaded file names
pub const MAX_FILENAME_LENGTH: usize = 255;

// ============================================================================
// File Name Validation
// ============================================================================

/// Lowercased extension of `filename` including the leading dot, if any
pub fn file_extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_lowercase()))
}

/// Validate that the uploaded file name carries one of the allowed extensions
pub fn validate_image_extension(filename: &str, allowed: &[&str]) -> Result<()> {
    if filename.len() > MAX_FILENAME_LENGTH {
        return Err(anyhow!(
            "File name exceeds maximum length of {} bytes (got {})",
            MAX_FILENAME_LENGTH,
            filename.len()
        ));
    }

    match file_extension(filename) {
        Some(ext) if allowed.iter().any(|a| a.eq_ignore_ascii_case(&ext)) => Ok(()),
        _ => {
            let mut sorted: Vec<&str> = allowed.to_vec();
            sorted.sort_unstable();
            Err(anyhow!(
                "Invalid file type. Allowed types: {}",
                sorted.join(", ")
            ))
        }
    }
}

// ============================================================================
// Payload Validation
// ============================================================================

/// Client-facing rejection for uploads above `max_bytes`
pub fn payload_too_large_message(max_bytes: usize) -> String {
    format!(
        "File too large. Maximum size: {}MB",
        max_bytes as f64 / (1024.0 * 1024.0)
    )
}

/// Validate the payload size against `max_bytes`
pub fn validate_payload_size(len: usize, max_bytes: usize) -> Result<()> {
    if len > max_bytes {
        return Err(anyhow!(payload_too_large_message(max_bytes)));
    }
    Ok(())
}

/// Validate that the payload is not empty
pub fn validate_non_empty_payload(len: usize) -> Result<()> {
    if len == 0 {
        return Err(anyhow!("Uploaded file is empty"));
    }
    Ok(())
}
