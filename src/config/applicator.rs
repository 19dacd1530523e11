//! Patch applicator - applies patch sets with idempotency checks
//!
//! This module provides high-level patch application that:
//! - Groups patches by target file (each file is read once, written once)
//! - Runs target preflight (binary rejection, UTF-8) before matching
//! - Applies each patch against the in-memory body via the fragment matcher
//! - Classifies re-runs of already-applied patches instead of failing them
//! - Reports detailed results for each patch

use crate::config::schema::{PatchConfig, PatchDefinition};
use crate::edit::{atomic_write, splice, EditError};
use crate::matcher::{find_fragment, MatchError, MatchStrategy};
use crate::safety::{SafetyError, WorkspaceGuard};
use crate::validate::{patchable_body, ValidateError};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Result of applying a single patch
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "PatchResult should be checked for success/failure"]
pub enum PatchResult {
    /// Patch was successfully applied
    Applied {
        file: PathBuf,
        strategy: MatchStrategy,
    },
    /// Patch was already applied (replacement present, search fragment gone)
    AlreadyApplied { file: PathBuf },
    /// Patch failed to apply
    Failed { file: PathBuf, reason: String },
}

impl fmt::Display for PatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchResult::Applied { file, strategy } => {
                write!(f, "Applied ({strategy}) to {}", file.display())
            }
            PatchResult::AlreadyApplied { file } => {
                write!(f, "Already applied to {}", file.display())
            }
            PatchResult::Failed { file, reason } => {
                write!(f, "Failed on {}: {}", file.display(), reason)
            }
        }
    }
}

/// Errors during patch application
#[derive(Debug)]
pub enum ApplicationError {
    /// File I/O error
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Target preflight rejected the file
    Validate(ValidateError),
    /// The matcher could not produce an effective substitution
    Match {
        file: PathBuf,
        source: MatchError,
        /// Nearest body line to the first search line, when one is close
        /// enough to be a useful re-derivation hint
        closest: Option<String>,
    },
    /// Workspace boundary violation
    Safety(SafetyError),
    /// Persisting the patched body failed
    Edit(EditError),
}

impl fmt::Display for ApplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplicationError::Io { path, source } => {
                write!(f, "I/O error on {}: {}", path.display(), source)
            }
            ApplicationError::Validate(e) => write!(f, "target rejected: {}", e),
            ApplicationError::Match {
                file,
                source,
                closest,
            } => {
                write!(f, "{} in {}", source, file.display())?;
                if let Some(line) = closest {
                    write!(f, " (closest line: {:?})", line)?;
                }
                Ok(())
            }
            ApplicationError::Safety(e) => write!(f, "safety check failed: {}", e),
            ApplicationError::Edit(e) => write!(f, "edit error: {}", e),
        }
    }
}

impl std::error::Error for ApplicationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApplicationError::Io { source, .. } => Some(source),
            ApplicationError::Validate(e) => Some(e),
            ApplicationError::Match { source, .. } => Some(source),
            ApplicationError::Safety(e) => Some(e),
            ApplicationError::Edit(e) => Some(e),
        }
    }
}

impl From<ValidateError> for ApplicationError {
    fn from(e: ValidateError) -> Self {
        ApplicationError::Validate(e)
    }
}

impl From<EditError> for ApplicationError {
    fn from(e: EditError) -> Self {
        ApplicationError::Edit(e)
    }
}

impl From<SafetyError> for ApplicationError {
    fn from(e: SafetyError) -> Self {
        ApplicationError::Safety(e)
    }
}

/// Apply a patch set to a workspace
///
/// # Arguments
///
/// * `config` - The patch set to apply
/// * `workspace_root` - Root directory of the workspace
///
/// # Returns
///
/// A vector of results, one per patch in the set
pub fn apply_patches(
    config: &PatchConfig,
    workspace_root: &Path,
) -> Vec<(String, Result<PatchResult, ApplicationError>)> {
    run_patches(config, workspace_root, true)
}

/// Check patch status without mutating the workspace.
///
/// Mirrors `apply_patches` result semantics (`Applied` means "would apply");
/// patches run against the in-memory body only and nothing is written back.
pub fn check_patches(
    config: &PatchConfig,
    workspace_root: &Path,
) -> Vec<(String, Result<PatchResult, ApplicationError>)> {
    run_patches(config, workspace_root, false)
}

/// Shared apply/check flow, grouped by file.
///
/// Each file is read once; its patches run sequentially against the evolving
/// in-memory body (spans shift after every substitution, so every patch
/// re-matches the current body), then one atomic write persists the result.
fn run_patches(
    config: &PatchConfig,
    workspace_root: &Path,
    persist: bool,
) -> Vec<(String, Result<PatchResult, ApplicationError>)> {
    // Workspace-relative sets promise their targets live inside the
    // workspace; enforce it. Absolute-path sets manage their own boundaries.
    let guard = if config.meta.workspace_relative {
        match WorkspaceGuard::new(workspace_root) {
            Ok(g) => Some(g),
            Err(e) => {
                // Workspace root itself is unusable; nothing can proceed.
                let msg = e.to_string();
                return config
                    .patches
                    .iter()
                    .map(|patch| {
                        (
                            patch.id.clone(),
                            Err(ApplicationError::Io {
                                path: workspace_root.to_path_buf(),
                                source: std::io::Error::new(
                                    std::io::ErrorKind::NotFound,
                                    msg.clone(),
                                ),
                            }),
                        )
                    })
                    .collect();
            }
        }
    } else {
        None
    };

    let mut patches_by_file: HashMap<PathBuf, Vec<&PatchDefinition>> = HashMap::new();

    for patch in &config.patches {
        let file_path = if config.meta.workspace_relative {
            workspace_root.join(&patch.file)
        } else {
            PathBuf::from(&patch.file)
        };
        patches_by_file.entry(file_path).or_default().push(patch);
    }

    let mut all_results = Vec::new();

    for (file_path, patches) in patches_by_file {
        let content = match fs::read(&file_path) {
            Ok(c) => c,
            Err(source) => {
                fan_out_io_error(&mut all_results, &file_path, &patches, source);
                continue;
            }
        };

        let body = match patchable_body(&file_path, &content) {
            Ok(b) => b,
            Err(e) => {
                // One rejection reason, reported against every patch on the file
                let reason = e.to_string();
                for patch in patches {
                    all_results.push((
                        patch.id.clone(),
                        Ok(PatchResult::Failed {
                            file: file_path.clone(),
                            reason: reason.clone(),
                        }),
                    ));
                }
                continue;
            }
        };

        if let Some(guard) = &guard {
            // Re-validated per patch so each result carries its own error.
            let mut violated = false;
            for patch in &patches {
                if let Err(e) = guard.validate_path(&file_path) {
                    all_results.push((patch.id.clone(), Err(ApplicationError::Safety(e))));
                    violated = true;
                }
            }
            if violated {
                continue;
            }
        }

        let mut body = body.to_string();
        let mut changed = false;
        let mut file_results = Vec::with_capacity(patches.len());

        for patch in &patches {
            let result = apply_one(patch, &file_path, &mut body);
            if matches!(result, Ok(PatchResult::Applied { .. })) {
                changed = true;
            }
            file_results.push((patch.id.clone(), result));
        }

        if persist && changed {
            if let Err(e) = atomic_write(&file_path, body.as_bytes()) {
                // The write is all-or-nothing; every per-patch outcome for
                // this file is void if it failed.
                let msg = e.to_string();
                all_results.extend(patches.iter().map(|patch| {
                    (
                        patch.id.clone(),
                        Err(ApplicationError::Edit(EditError::Io(std::io::Error::new(
                            std::io::ErrorKind::Other,
                            msg.clone(),
                        )))),
                    )
                }));
                continue;
            }
        }

        all_results.extend(file_results);
    }

    all_results
}

fn fan_out_io_error(
    results: &mut Vec<(String, Result<PatchResult, ApplicationError>)>,
    file_path: &Path,
    patches: &[&PatchDefinition],
    source: std::io::Error,
) {
    let kind = source.kind();
    let msg = source.to_string();
    for patch in patches {
        results.push((
            patch.id.clone(),
            Err(ApplicationError::Io {
                path: file_path.to_path_buf(),
                source: std::io::Error::new(kind, msg.clone()),
            }),
        ));
    }
}

/// Apply one patch against the in-memory body, advancing it on success.
fn apply_one(
    patch: &PatchDefinition,
    file_path: &Path,
    body: &mut String,
) -> Result<PatchResult, ApplicationError> {
    match find_fragment(body, &patch.search) {
        Ok(found) => {
            let new_body = splice(body, found.byte_start, found.byte_end, &patch.replace);
            if new_body == *body {
                return Err(ApplicationError::Match {
                    file: file_path.to_path_buf(),
                    source: MatchError::NoEffectiveChange,
                    closest: None,
                });
            }
            *body = new_body;
            Ok(PatchResult::Applied {
                file: file_path.to_path_buf(),
                strategy: found.strategy,
            })
        }
        Err(MatchError::NotFound) => {
            // Idempotency probe: a re-run of an applied patch finds the
            // replacement where the search fragment used to be. An empty or
            // whitespace replacement is indistinguishable from absence, so
            // only a substantive replacement counts.
            if patch.replace.split_whitespace().next().is_some() && body.contains(&patch.replace) {
                Ok(PatchResult::AlreadyApplied {
                    file: file_path.to_path_buf(),
                })
            } else {
                Err(ApplicationError::Match {
                    file: file_path.to_path_buf(),
                    source: MatchError::NotFound,
                    closest: closest_line(body, &patch.search),
                })
            }
        }
        Err(e) => Err(ApplicationError::Match {
            file: file_path.to_path_buf(),
            source: e,
            closest: None,
        }),
    }
}

/// Similarity floor below which a "closest line" hint is noise, not help.
const CLOSEST_LINE_THRESHOLD: f64 = 0.6;

/// Find the body line most similar to the first line of the search fragment.
///
/// Diagnostics only: the hint helps a caller re-derive a better fragment
/// after NotFound. Matching itself never becomes fuzzy.
fn closest_line(body: &str, search: &str) -> Option<String> {
    let needle = search.lines().next()?.trim();
    if needle.is_empty() {
        return None;
    }

    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| (strsim::normalized_levenshtein(needle, line), line))
        .filter(|(score, _)| *score >= CLOSEST_LINE_THRESHOLD)
        .max_by(|(a, _), (b, _)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(_, line)| line.to_string())
}
