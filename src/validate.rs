//! Target preflight checks run before the matcher sees a file.
//!
//! The matcher operates on text bodies only; it is the caller's job to keep
//! binary artifacts out. This module provides:
//! - Extension screening against a known-binary denylist
//! - Content sniffing (NUL byte within the first 8 KiB means binary)
//! - UTF-8 decoding of the body handed to the matcher
//!
//! # Hard Rules (Never Violate)
//!
//! 1. **Text only**: A target that fails any check is refused before
//!    matching. No lossy decoding, no best-effort patching of binaries.
//! 2. **Whole-body decode**: The matcher receives a `&str`; partial or
//!    replacement-character decoding would silently corrupt spans.

use std::fs;
use std::path::Path;
use thiserror::Error;

/// How many leading bytes are sniffed for NUL (git's binary heuristic).
const SNIFF_LEN: usize = 8192;

/// File extensions that are never patchable text.
const BINARY_EXTENSIONS: &[&str] = &[
    // Images
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "tiff",
    // Archives
    "zip", "tar", "gz", "bz2", "xz", "zst", "7z", "rar", "jar",
    // Executables and object code
    "exe", "dll", "so", "dylib", "a", "o", "class", "wasm", "bin",
    // Documents and media
    "pdf", "mp3", "mp4", "avi", "mov", "ogg", "wav", "flac",
    // Fonts
    "ttf", "otf", "woff", "woff2",
    // Databases
    "db", "sqlite", "sqlite3",
];

/// Preflight errors.
#[derive(Error, Debug)]
pub enum ValidateError {
    #[error("refusing to patch binary file type '.{extension}': {path}")]
    BinaryExtension { path: String, extension: String },

    #[error("refusing to patch binary content (NUL byte at offset {offset}): {path}")]
    BinaryContent { path: String, offset: usize },

    #[error("file is not valid UTF-8: {path}")]
    NotUtf8 { path: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Check whether a path's extension marks it as a known binary type.
pub fn is_binary_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            BINARY_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Find the first NUL byte within the sniff window, if any.
fn find_nul(content: &[u8]) -> Option<usize> {
    content
        .iter()
        .take(SNIFF_LEN)
        .position(|&byte| byte == 0)
}

/// Validate raw file content as a patchable text body.
///
/// Checks extension, sniffs for NUL bytes, and decodes the whole body as
/// UTF-8. Returns the decoded body on success.
pub fn patchable_body<'a>(path: &Path, content: &'a [u8]) -> Result<&'a str, ValidateError> {
    if is_binary_extension(path) {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        return Err(ValidateError::BinaryExtension {
            path: path.display().to_string(),
            extension,
        });
    }

    if let Some(offset) = find_nul(content) {
        return Err(ValidateError::BinaryContent {
            path: path.display().to_string(),
            offset,
        });
    }

    std::str::from_utf8(content).map_err(|_| ValidateError::NotUtf8 {
        path: path.display().to_string(),
    })
}

/// Read a file and validate it as a patchable text body.
pub fn read_patchable(path: &Path) -> Result<String, ValidateError> {
    let content = fs::read(path)?;
    patchable_body(path, &content).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn text_extensions_pass() {
        assert!(!is_binary_extension(Path::new("src/main.rs")));
        assert!(!is_binary_extension(Path::new("README.md")));
        assert!(!is_binary_extension(Path::new("Makefile")));
        assert!(!is_binary_extension(Path::new("config.yaml")));
    }

    #[test]
    fn binary_extensions_rejected() {
        assert!(is_binary_extension(Path::new("logo.png")));
        assert!(is_binary_extension(Path::new("release.tar.gz")));
        assert!(is_binary_extension(Path::new("lib.SO")));
        assert!(is_binary_extension(Path::new("font.woff2")));
    }

    #[test]
    fn patchable_body_accepts_text() {
        let body = patchable_body(Path::new("notes.txt"), b"plain text\n").unwrap();
        assert_eq!(body, "plain text\n");
    }

    #[test]
    fn patchable_body_rejects_binary_extension() {
        let result = patchable_body(Path::new("logo.png"), b"plain text");
        assert!(matches!(
            result,
            Err(ValidateError::BinaryExtension { .. })
        ));
    }

    #[test]
    fn patchable_body_rejects_nul_content() {
        let result = patchable_body(Path::new("data.txt"), b"text\0more");
        assert!(matches!(
            result,
            Err(ValidateError::BinaryContent { offset: 4, .. })
        ));
    }

    #[test]
    fn patchable_body_rejects_invalid_utf8() {
        let result = patchable_body(Path::new("data.txt"), &[0xFF, 0xFE, b'a']);
        assert!(matches!(result, Err(ValidateError::NotUtf8 { .. })));
    }

    #[test]
    fn nul_outside_sniff_window_is_not_sniffed() {
        // The sniff window is bounded; a NUL past it is not detected (NUL is
        // valid UTF-8, so the decode pass does not catch it either).
        let mut content = vec![b'a'; SNIFF_LEN];
        content.push(0);
        let path = PathBuf::from("big.txt");
        assert!(patchable_body(&path, &content).is_ok());
    }

    #[test]
    fn read_patchable_reads_and_validates() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file = temp_dir.path().join("sample.txt");
        fs::write(&file, "hello\n").unwrap();

        assert_eq!(read_patchable(&file).unwrap(), "hello\n");
    }
}
