use serde::Deserialize;
use std::fmt;

/// A patch set: metadata plus an ordered list of search/replace patches.
///
/// Patch sets are TOML documents. Every field is typed and validated at load
/// time; there is no untyped parameter bag to probe at use sites.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct PatchConfig {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub patches: Vec<PatchDefinition>,
}

impl PatchConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.patches.is_empty() {
            issues.push(ValidationIssue::EmptyPatchList);
        }

        for patch in &self.patches {
            if patch.id.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    patch_id: None,
                    field: "id",
                });
            }
            if patch.file.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    patch_id: Some(patch.id.clone()),
                    field: "file",
                });
            }

            // The matcher's construction invariant, enforced early so a bad
            // patch set fails at load rather than mid-application.
            if patch.search.split_whitespace().next().is_none() {
                issues.push(ValidationIssue::EmptySearch {
                    patch_id: Some(patch.id.clone()),
                });
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// When true, patch file paths are resolved against the workspace root.
    #[serde(default)]
    pub workspace_relative: bool,
}

/// A single search/replace patch against one file.
#[derive(Debug, Deserialize, Clone)]
pub struct PatchDefinition {
    pub id: String,
    pub file: String,
    /// Fragment to locate (exact pass first, relaxed whitespace pass second).
    pub search: String,
    /// Replacement for the first located occurrence.
    pub replace: String,
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    EmptyPatchList,
    MissingField {
        patch_id: Option<String>,
        field: &'static str,
    },
    EmptySearch {
        patch_id: Option<String>,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyPatchList => write!(f, "patch config contains no patches"),
            ValidationIssue::MissingField { patch_id, field } => match patch_id {
                Some(id) => write!(f, "patch '{id}' missing required field '{field}'"),
                None => write!(f, "patch missing required field '{field}'"),
            },
            ValidationIssue::EmptySearch { patch_id } => match patch_id {
                Some(id) => write!(
                    f,
                    "patch '{id}' has a search fragment that is empty after whitespace normalization"
                ),
                None => write!(
                    f,
                    "patch has a search fragment that is empty after whitespace normalization"
                ),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patch(id: &str, file: &str, search: &str, replace: &str) -> PatchDefinition {
        PatchDefinition {
            id: id.to_string(),
            file: file.to_string(),
            search: search.to_string(),
            replace: replace.to_string(),
        }
    }

    #[test]
    fn valid_config_passes() {
        let config = PatchConfig {
            meta: Metadata::default(),
            patches: vec![patch("fix-greeting", "hello.py", "Hello", "Howdy")],
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_patch_list_flagged() {
        let config = PatchConfig::default();
        let err = config.validate().unwrap_err();
        assert!(matches!(err.issues[0], ValidationIssue::EmptyPatchList));
    }

    #[test]
    fn missing_id_and_file_flagged() {
        let config = PatchConfig {
            meta: Metadata::default(),
            patches: vec![patch("", "", "needle", "thread")],
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.issues.len(), 2);
        assert!(err
            .issues
            .iter()
            .all(|i| matches!(i, ValidationIssue::MissingField { .. })));
    }

    #[test]
    fn whitespace_only_search_flagged() {
        let config = PatchConfig {
            meta: Metadata::default(),
            patches: vec![patch("p1", "a.txt", " \t\n", "thread")],
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err.issues[0],
            ValidationIssue::EmptySearch { .. }
        ));
    }

    #[test]
    fn all_issues_collected_not_just_first() {
        let config = PatchConfig {
            meta: Metadata::default(),
            patches: vec![
                patch("", "a.txt", "ok", "fine"),
                patch("p2", "", "  ", "fine"),
            ],
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.issues.len(), 3);
    }
}
