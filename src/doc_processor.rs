use crate::db::models::{check_media_size, NewCachedFile};
use crate::error::AppError;
use std::fs;
use std::path::Path;

/// Extracted text longer than this is cut off.
pub const MAX_EXTRACT_CHARS: usize = 2000;
const TRUNCATION_NOTE: &str = "... (content truncated due to length)";

/// Guess a MIME type from the file extension.
pub fn mime_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "txt" => "text/plain",
        "html" | "htm" => "text/html",
        "xml" => "text/xml",
        "md" | "markdown" => "text/markdown",
        "json" => "application/json",
        "csv" => "text/csv",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "m4a" => "audio/mp4",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        _ => "application/octet-stream",
    }
}

fn is_text(mime_type: &str) -> bool {
    mime_type.starts_with("text/") || mime_type == "application/json"
}

fn describe(label: &str, name: &str, size: usize, mime_type: &str) -> String {
    let kb = size as f64 / 1024.0;
    if mime_type == "application/pdf" {
        format!("[{}: {} ({:.1} KB)]", label, name, kb)
    } else {
        format!("[{}: {} ({:.1} KB, {})]", label, name, kb, mime_type)
    }
}

fn truncate_extract(text: &str) -> String {
    if text.chars().count() > MAX_EXTRACT_CHARS {
        let head: String = text.chars().take(MAX_EXTRACT_CHARS).collect();
        format!("{}{}", head, TRUNCATION_NOTE)
    } else {
        text.to_string()
    }
}

/// Turn uploaded bytes into the text that is cached and offered to the
/// prompt: readable documents yield their (truncated) text, everything
/// else a bracketed description.
pub fn extract_content(name: &str, mime_type: &str, bytes: &[u8]) -> String {
    if is_text(mime_type) {
        let text = String::from_utf8_lossy(bytes);
        return truncate_extract(&text);
    }

    match mime_type {
        // The PDF parser can panic on malformed input.
        "application/pdf" => match std::panic::catch_unwind(|| {
            pdf_extract::extract_text_from_mem(bytes)
        }) {
            Ok(Ok(text)) if !text.trim().is_empty() => truncate_extract(text.trim()),
            _ => describe("PDF Document", name, bytes.len(), mime_type),
        },
        m if m.starts_with("image/") => describe("Image", name, bytes.len(), m),
        m if m.starts_with("audio/") => describe("Audio", name, bytes.len(), m),
        m if m.starts_with("video/") => describe("Video", name, bytes.len(), m),
        "application/octet-stream" => describe("File", name, bytes.len(), "unknown type"),
        m => describe("File", name, bytes.len(), m),
    }
}

/// Read and describe a file for the upload cache. Oversized files are
/// rejected before anything is read into the cache.
pub fn parse_file(path: &Path) -> Result<NewCachedFile, AppError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string();
    let size = fs::metadata(path)?.len();
    check_media_size(size as usize)?;

    let mime_type = mime_type_for(path);
    let bytes = fs::read(path)?;
    let content = extract_content(&name, mime_type, &bytes);

    Ok(NewCachedFile {
        name,
        mime_type: mime_type.to_string(),
        size,
        content,
    })
}
