//! Smart Patch: flexible search/replace patching for automated coding workflows
//!
//! Locates a search fragment in a text body and replaces its first occurrence,
//! trying an exact pass first and falling back to a relaxed pass that tolerates
//! whitespace and indentation drift between the fragment and the on-disk text.
//!
//! # Architecture
//!
//! The matcher is a pure function of its inputs: it reports a byte span and
//! which strategy located it, and performs no I/O. Persistence lives in
//! [`Edit`], a verified span replacement with atomic file writes, and in the
//! config applicator, which runs TOML-defined patch sets file by file.
//!
//! # Matching contract
//!
//! - Exact pass first: verbatim substring, formatting preserved
//! - Relaxed pass second: whitespace-delimited tokens, literal, in order,
//!   separated by one-or-more whitespace of any kind
//! - First (leftmost) occurrence only, in either pass
//! - A whitespace-only search fragment is rejected, never matched
//! - A substitution with no observable effect is an error, not a success
//!
//! # Example
//!
//! ```
//! use smart_patch::{apply_patch, MatchStrategy};
//!
//! let body = "function foo() {\n    return 1;\n}";
//! let patched = apply_patch(body, "return 1;", "return 2;").unwrap();
//!
//! assert_eq!(patched.strategy, MatchStrategy::Exact);
//! assert_eq!(patched.body, "function foo() {\n    return 2;\n}");
//! ```

pub mod cache;
pub mod config;
pub mod edit;
pub mod matcher;
mod matcher_proptest;
pub mod safety;
pub mod validate;

// Re-exports
pub use config::{
    apply_patches, check_patches, load_from_path, load_from_str, ApplicationError, ConfigError,
    PatchConfig, PatchDefinition, PatchResult,
};
pub use edit::{atomic_write, Edit, EditError, EditResult, EditVerification};
pub use matcher::{
    apply_patch, find_fragment, relaxed_pattern, FragmentMatch, MatchError, MatchStrategy,
    Patched, PatchRequest,
};
pub use safety::{SafetyError, WorkspaceGuard};
pub use validate::{is_binary_extension, read_patchable, ValidateError};
