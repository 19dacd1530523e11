use crate::cache;
use std::fmt;
use thiserror::Error;

/// Which pass located the search fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    /// Literal substring match, formatting preserved exactly.
    Exact,
    /// Token-order match tolerant of whitespace differences between tokens.
    Relaxed,
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchStrategy::Exact => write!(f, "exact"),
            MatchStrategy::Relaxed => write!(f, "relaxed"),
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum MatchError {
    #[error("search fragment is empty after whitespace normalization")]
    EmptySearch,

    #[error("search fragment not found (exact and relaxed passes both failed)")]
    NotFound,

    #[error("replacement produced output identical to input (no effective change)")]
    NoEffectiveChange,

    #[error("failed to compile relaxed pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// A located fragment: the byte span within the body and the pass that found it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentMatch {
    /// Starting byte offset (inclusive)
    pub byte_start: usize,
    /// Ending byte offset (exclusive)
    pub byte_end: usize,
    pub strategy: MatchStrategy,
}

/// Result of a successful substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "Patched carries the replaced body; dropping it discards the patch"]
pub struct Patched {
    /// The body with the first match replaced.
    pub body: String,
    /// Which pass located the fragment.
    pub strategy: MatchStrategy,
    /// Byte span of the replaced fragment in the original body.
    pub byte_start: usize,
    pub byte_end: usize,
}

/// A single search/replace request against a text body.
///
/// Construction validates the one invariant the matcher depends on: the search
/// fragment must be non-empty after whitespace normalization. A whitespace-only
/// fragment is rejected here, before either pass runs, so it can never match
/// the body's own whitespace.
#[derive(Debug, Clone)]
pub struct PatchRequest {
    body: String,
    search: String,
    replace: String,
}

impl PatchRequest {
    pub fn new(
        body: impl Into<String>,
        search: impl Into<String>,
        replace: impl Into<String>,
    ) -> Result<Self, MatchError> {
        let search = search.into();
        if search.split_whitespace().next().is_none() {
            return Err(MatchError::EmptySearch);
        }
        Ok(Self {
            body: body.into(),
            search,
            replace: replace.into(),
        })
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn replace(&self) -> &str {
        &self.replace
    }

    /// Locate the search fragment and replace its first occurrence.
    ///
    /// Runs the exact pass, then the relaxed pass, via [`find_fragment`]. A
    /// substitution whose output is byte-for-byte identical to the input body
    /// fails with [`MatchError::NoEffectiveChange`]; callers must not mistake
    /// a no-op for progress.
    pub fn apply(&self) -> Result<Patched, MatchError> {
        let found = find_fragment(&self.body, &self.search)?;

        let mut body = String::with_capacity(
            self.body.len() + self.replace.len() - (found.byte_end - found.byte_start),
        );
        body.push_str(&self.body[..found.byte_start]);
        body.push_str(&self.replace);
        body.push_str(&self.body[found.byte_end..]);

        if body == self.body {
            return Err(MatchError::NoEffectiveChange);
        }

        Ok(Patched {
            body,
            strategy: found.strategy,
            byte_start: found.byte_start,
            byte_end: found.byte_end,
        })
    }
}

/// Locate the first occurrence of `search` within `body`.
///
/// Pass 1 looks for the fragment verbatim as a contiguous substring. Pass 2
/// (only attempted if pass 1 fails) tokenizes the fragment on whitespace and
/// matches the tokens literally, in order, separated by one-or-more whitespace
/// characters of any kind, scanning the whole body as a single unit. Only the
/// leftmost match is reported in either pass.
pub fn find_fragment(body: &str, search: &str) -> Result<FragmentMatch, MatchError> {
    // Validated again here so the free function upholds the invariant even
    // when called without a PatchRequest. Checked before the exact pass: a
    // whitespace-only fragment must not exact-match the body's whitespace.
    if search.split_whitespace().next().is_none() {
        return Err(MatchError::EmptySearch);
    }

    if let Some(start) = body.find(search) {
        return Ok(FragmentMatch {
            byte_start: start,
            byte_end: start + search.len(),
            strategy: MatchStrategy::Exact,
        });
    }

    let pattern = relaxed_pattern(search)?;
    let re = cache::get_or_compile_pattern(&pattern)?;

    match re.find(body) {
        Some(m) => Ok(FragmentMatch {
            byte_start: m.start(),
            byte_end: m.end(),
            strategy: MatchStrategy::Relaxed,
        }),
        None => Err(MatchError::NotFound),
    }
}

/// Convenience wrapper: construct a [`PatchRequest`] and apply it.
pub fn apply_patch(body: &str, search: &str, replace: &str) -> Result<Patched, MatchError> {
    PatchRequest::new(body, search, replace)?.apply()
}

/// Build the relaxed-pass regex source for a search fragment.
///
/// Tokens are regex-escaped (metacharacters in the fragment are literal text,
/// never pattern syntax) and joined with `\s+`, which crosses newlines.
pub fn relaxed_pattern(search: &str) -> Result<String, MatchError> {
    let tokens: Vec<String> = search.split_whitespace().map(regex::escape).collect();
    if tokens.is_empty() {
        return Err(MatchError::EmptySearch);
    }
    Ok(tokens.join(r"\s+"))
}
