//! Thread-local compilation cache for relaxed-pass regexes.
//!
//! Caches compiled patterns to avoid redundant recompilation when the same
//! search fragment is applied across many files or repeated invocations.
//! Cache is capped at 256 entries; it is cleared and rebuilt on demand when full.

use regex::Regex;
use std::cell::RefCell;
use std::collections::HashMap;

const MAX_CACHE_ENTRIES: usize = 256;

thread_local! {
    static PATTERN_CACHE: RefCell<HashMap<String, Regex>> =
        RefCell::new(HashMap::new());
}

/// Get a compiled pattern from cache, or compile and cache it.
///
/// Patterns are cached thread-locally, capped at 256 entries. When the cap is
/// reached, the cache is cleared and rebuilt on demand.
pub fn get_or_compile_pattern(pattern_str: &str) -> Result<Regex, regex::Error> {
    PATTERN_CACHE.with(|cache| {
        let mut cache = cache.borrow_mut();

        if let Some(re) = cache.get(pattern_str) {
            return Ok(re.clone());
        }

        // Evict all if at capacity (simple but effective for batch workloads)
        if cache.len() >= MAX_CACHE_ENTRIES {
            cache.clear();
        }

        let compiled = Regex::new(pattern_str)?;
        cache.insert(pattern_str.to_string(), compiled.clone());
        Ok(compiled)
    })
}

/// Clear the pattern cache (mainly for testing).
pub fn clear_cache() {
    PATTERN_CACHE.with(|cache| {
        cache.borrow_mut().clear();
    });
}

/// Get cache statistics for monitoring.
pub fn cache_size() -> usize {
    PATTERN_CACHE.with(|cache| cache.borrow().len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_once_then_hit() {
        clear_cache();
        let first = get_or_compile_pattern(r"a\s+b").unwrap();
        assert_eq!(cache_size(), 1);

        let second = get_or_compile_pattern(r"a\s+b").unwrap();
        assert_eq!(cache_size(), 1);
        assert_eq!(first.as_str(), second.as_str());
    }

    #[test]
    fn distinct_patterns_get_distinct_entries() {
        clear_cache();
        get_or_compile_pattern(r"x\s+y").unwrap();
        get_or_compile_pattern(r"y\s+z").unwrap();
        assert_eq!(cache_size(), 2);
    }

    #[test]
    fn eviction_clears_at_capacity() {
        clear_cache();
        for i in 0..MAX_CACHE_ENTRIES {
            get_or_compile_pattern(&format!(r"tok{i}\s+end")).unwrap();
        }
        assert_eq!(cache_size(), MAX_CACHE_ENTRIES);

        // Next insert triggers a full clear before caching the newcomer.
        get_or_compile_pattern(r"fresh\s+entry").unwrap();
        assert_eq!(cache_size(), 1);
    }

    #[test]
    fn invalid_pattern_propagates() {
        clear_cache();
        assert!(get_or_compile_pattern(r"(unclosed").is_err());
        assert_eq!(cache_size(), 0);
    }
}
