use crate::matcher::FragmentMatch;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// The persistence primitive: a verified byte-span replacement in one file.
///
/// The matcher owns all location intelligence; an `Edit` only carries a span
/// it was handed, verifies the text it expects to find there, and writes the
/// result atomically. The core matcher itself never touches storage.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "Edit does nothing until apply() is called"]
pub struct Edit {
    /// Path to the file to edit
    pub file: PathBuf,
    /// Starting byte offset (inclusive)
    pub byte_start: usize,
    /// Ending byte offset (exclusive)
    pub byte_end: usize,
    /// New text to insert at [byte_start, byte_end)
    pub new_text: String,
    /// Verification of what we expect to find before applying
    pub expected_before: EditVerification,
}

/// Verification strategy for edit safety.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditVerification {
    /// Exact text match required
    ExactMatch(String),
    /// xxh3 hash of expected text (faster for large spans)
    Hash(u64),
}

impl EditVerification {
    /// Check if the provided text matches the verification criteria.
    pub fn matches(&self, text: &str) -> bool {
        match self {
            EditVerification::ExactMatch(expected) => text == expected,
            EditVerification::Hash(expected_hash) => xxh3_64(text.as_bytes()) == *expected_hash,
        }
    }

    /// Create verification from text, using hash for text over 1KB.
    pub fn from_text(text: &str) -> Self {
        if text.len() > 1024 {
            EditVerification::Hash(xxh3_64(text.as_bytes()))
        } else {
            EditVerification::ExactMatch(text.to_string())
        }
    }

    /// Get hash value regardless of variant.
    pub fn hash(&self) -> u64 {
        match self {
            EditVerification::Hash(h) => *h,
            EditVerification::ExactMatch(text) => xxh3_64(text.as_bytes()),
        }
    }
}

#[derive(Error, Debug)]
pub enum EditError {
    #[error("before-text verification failed at {file}:{byte_start}")]
    BeforeTextMismatch {
        file: PathBuf,
        byte_start: usize,
        byte_end: usize,
        expected: String,
        found: String,
    },

    #[error("invalid byte range: [{byte_start}, {byte_end}) in file of length {file_len}")]
    InvalidByteRange {
        byte_start: usize,
        byte_end: usize,
        file_len: usize,
    },

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("UTF-8 validation error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("edit would create malformed UTF-8")]
    InvalidUtf8Edit,
}

/// Result of applying an edit.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "EditResult should be checked for success/already-applied"]
pub enum EditResult {
    /// Edit was successfully applied
    Applied { file: PathBuf, bytes_changed: usize },
    /// Edit was already applied (current text matches new_text)
    AlreadyApplied { file: PathBuf },
}

impl Edit {
    /// Create a new edit with automatic verification generation.
    pub fn new(
        file: impl Into<PathBuf>,
        byte_start: usize,
        byte_end: usize,
        new_text: impl Into<String>,
        expected_before: impl Into<String>,
    ) -> Self {
        let expected = expected_before.into();
        Self {
            file: file.into(),
            byte_start,
            byte_end,
            new_text: new_text.into(),
            expected_before: EditVerification::from_text(&expected),
        }
    }

    /// Build an edit from a fragment located by the matcher.
    ///
    /// The verification text is taken from the matched span of `body`, so the
    /// edit will refuse to apply if the file changed between match and write.
    pub fn from_fragment(
        file: impl Into<PathBuf>,
        body: &str,
        found: FragmentMatch,
        new_text: impl Into<String>,
    ) -> Self {
        Self::new(
            file,
            found.byte_start,
            found.byte_end,
            new_text,
            &body[found.byte_start..found.byte_end],
        )
    }

    /// Create an edit with explicit verification strategy.
    pub fn with_verification(
        file: impl Into<PathBuf>,
        byte_start: usize,
        byte_end: usize,
        new_text: impl Into<String>,
        verification: EditVerification,
    ) -> Self {
        Self {
            file: file.into(),
            byte_start,
            byte_end,
            new_text: new_text.into(),
            expected_before: verification,
        }
    }

    /// Validate the edit against the current file contents.
    ///
    /// Returns the current text at [byte_start, byte_end) if validation succeeds.
    fn validate<'a>(&self, content: &'a [u8]) -> Result<&'a str, EditError> {
        if self.byte_start > self.byte_end || self.byte_end > content.len() {
            return Err(EditError::InvalidByteRange {
                byte_start: self.byte_start,
                byte_end: self.byte_end,
                file_len: content.len(),
            });
        }

        let current_text = std::str::from_utf8(&content[self.byte_start..self.byte_end])?;

        // Already applied (idempotency): skip before-text verification
        if current_text == self.new_text {
            return Ok(current_text);
        }

        if !self.expected_before.matches(current_text) {
            return Err(EditError::BeforeTextMismatch {
                file: self.file.clone(),
                byte_start: self.byte_start,
                byte_end: self.byte_end,
                expected: format!("{:?}", self.expected_before),
                found: current_text.to_string(),
            });
        }

        Ok(current_text)
    }

    /// Apply this edit to the file system atomically.
    ///
    /// Uses tempfile + fsync + rename for crash safety.
    pub fn apply(&self) -> Result<EditResult, EditError> {
        let original_content = fs::read(&self.file)?;

        let current_text = self.validate(&original_content)?;

        if current_text == self.new_text {
            return Ok(EditResult::AlreadyApplied {
                file: self.file.clone(),
            });
        }

        let mut new_content = Vec::with_capacity(
            original_content.len() + self.new_text.len() - (self.byte_end - self.byte_start),
        );
        new_content.extend_from_slice(&original_content[..self.byte_start]);
        new_content.extend_from_slice(self.new_text.as_bytes());
        new_content.extend_from_slice(&original_content[self.byte_end..]);

        // A span that slipped past verification must never reach disk malformed
        std::str::from_utf8(&new_content).map_err(|_| EditError::InvalidUtf8Edit)?;

        atomic_write(&self.file, &new_content)?;

        // Bump mtime so file watchers and incremental build tools notice
        let now = filetime::FileTime::now();
        filetime::set_file_mtime(&self.file, now)?;

        Ok(EditResult::Applied {
            file: self.file.clone(),
            bytes_changed: self.new_text.len(),
        })
    }
}

/// Replace `[byte_start, byte_end)` of `body` with `new_text`, in memory.
///
/// Used by the applicator's read-once/write-once flow: several patches run
/// against the same in-memory body before a single atomic write.
pub fn splice(body: &str, byte_start: usize, byte_end: usize, new_text: &str) -> String {
    let mut out = String::with_capacity(body.len() + new_text.len() - (byte_end - byte_start));
    out.push_str(&body[..byte_start]);
    out.push_str(new_text);
    out.push_str(&body[byte_end..]);
    out
}

/// Atomic file write: tempfile + fsync + rename.
///
/// This ensures crash safety - either the full write succeeds or nothing changes.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<(), EditError> {
    // Create tempfile in same directory to ensure same filesystem
    let parent = path.parent().ok_or_else(|| {
        EditError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "Path has no parent directory",
        ))
    })?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}
