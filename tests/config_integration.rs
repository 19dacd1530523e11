//! Integration tests for the patch set layer
//!
//! Tests config loading/validation and full patch application through the
//! public API, including idempotent re-runs and failure classification.

use smart_patch::config::{
    apply_patches, check_patches, load_from_str, ApplicationError, ConfigError, PatchResult,
};
use smart_patch::matcher::{MatchError, MatchStrategy};
use std::fs;
use tempfile::TempDir;

/// Helper to create a temp workspace with test files
fn setup_test_workspace() -> TempDir {
    let dir = TempDir::new().unwrap();

    fs::write(
        dir.path().join("app.py"),
        r#"def greet():
    print("Hello")

def farewell():
    print("Goodbye")
"#,
    )
    .unwrap();

    fs::write(
        dir.path().join("config.ini"),
        "[server]\nport = 8080\nhost = localhost\n",
    )
    .unwrap();

    dir
}

#[test]
fn load_patch_config_basic() {
    let toml = r#"
[meta]
name = "test-patches"
description = "Test patch set"
workspace_relative = true

[[patches]]
id = "patch-1"
file = "app.py"
search = "print(\"Hello\")"
replace = "print(\"Hi\")"
"#;

    let config = load_from_str(toml).expect("Failed to parse config");

    assert_eq!(config.meta.name, "test-patches");
    assert_eq!(
        config.meta.description,
        Some("Test patch set".to_string())
    );
    assert!(config.meta.workspace_relative);
    assert_eq!(config.patches.len(), 1);
    assert_eq!(config.patches[0].id, "patch-1");
    assert_eq!(config.patches[0].search, "print(\"Hello\")");
}

#[test]
fn load_rejects_missing_required_fields() {
    // No search/replace on the patch
    let toml = r#"
[[patches]]
id = "incomplete"
file = "app.py"
"#;
    let err = load_from_str(toml).unwrap_err();
    assert!(matches!(err, ConfigError::Toml { .. }));
}

#[test]
fn load_rejects_whitespace_only_search() {
    let toml = r#"
[[patches]]
id = "blank"
file = "app.py"
search = " \t "
replace = "something"
"#;
    let err = load_from_str(toml).unwrap_err();
    assert!(matches!(err, ConfigError::Validation { .. }));
}

#[test]
fn load_rejects_empty_patch_list() {
    let toml = r#"
[meta]
name = "empty"
"#;
    let err = load_from_str(toml).unwrap_err();
    assert!(matches!(err, ConfigError::Validation { .. }));
}

#[test]
fn apply_exact_patch_end_to_end() {
    let workspace = setup_test_workspace();

    let config = load_from_str(
        r#"
[meta]
workspace_relative = true

[[patches]]
id = "greet-hi"
file = "app.py"
search = "print(\"Hello\")"
replace = "print(\"Hi\")"
"#,
    )
    .unwrap();

    let results = apply_patches(&config, workspace.path());

    assert_eq!(results.len(), 1);
    assert!(matches!(
        results[0].1,
        Ok(PatchResult::Applied {
            strategy: MatchStrategy::Exact,
            ..
        })
    ));

    let content = fs::read_to_string(workspace.path().join("app.py")).unwrap();
    assert!(content.contains("print(\"Hi\")"));
    assert!(!content.contains("print(\"Hello\")"));
}

#[test]
fn apply_relaxed_patch_end_to_end() {
    let workspace = setup_test_workspace();

    // Search joins lines with single spaces; the file has newline + indent.
    let config = load_from_str(
        r#"
[meta]
workspace_relative = true

[[patches]]
id = "inline-greet"
file = "app.py"
search = "def greet(): print(\"Hello\")"
replace = "def greet():\n    print(\"Hi there\")"
"#,
    )
    .unwrap();

    let results = apply_patches(&config, workspace.path());

    assert!(matches!(
        results[0].1,
        Ok(PatchResult::Applied {
            strategy: MatchStrategy::Relaxed,
            ..
        })
    ));

    let content = fs::read_to_string(workspace.path().join("app.py")).unwrap();
    assert!(content.contains("print(\"Hi there\")"));
}

#[test]
fn second_run_reports_already_applied() {
    let workspace = setup_test_workspace();

    let config = load_from_str(
        r#"
[meta]
workspace_relative = true

[[patches]]
id = "port-bump"
file = "config.ini"
search = "port = 8080"
replace = "port = 9090"
"#,
    )
    .unwrap();

    let first = apply_patches(&config, workspace.path());
    assert!(matches!(first[0].1, Ok(PatchResult::Applied { .. })));

    let second = apply_patches(&config, workspace.path());
    assert!(matches!(
        second[0].1,
        Ok(PatchResult::AlreadyApplied { .. })
    ));

    // Body unchanged by the second run
    let content = fs::read_to_string(workspace.path().join("config.ini")).unwrap();
    assert_eq!(content.matches("9090").count(), 1);
}

#[test]
fn unmatched_search_is_not_found() {
    let workspace = setup_test_workspace();

    let config = load_from_str(
        r#"
[meta]
workspace_relative = true

[[patches]]
id = "ghost"
file = "app.py"
search = "does_not_exist()"
replace = "nothing()"
"#,
    )
    .unwrap();

    let results = apply_patches(&config, workspace.path());

    assert!(matches!(
        results[0].1,
        Err(ApplicationError::Match {
            source: MatchError::NotFound,
            ..
        })
    ));
}

#[test]
fn identical_replacement_is_surfaced_not_swallowed() {
    let workspace = setup_test_workspace();

    let config = load_from_str(
        r#"
[meta]
workspace_relative = true

[[patches]]
id = "noop"
file = "config.ini"
search = "host = localhost"
replace = "host = localhost"
"#,
    )
    .unwrap();

    let results = apply_patches(&config, workspace.path());

    assert!(matches!(
        results[0].1,
        Err(ApplicationError::Match {
            source: MatchError::NoEffectiveChange,
            ..
        })
    ));
}

#[test]
fn check_patches_leaves_workspace_untouched() {
    let workspace = setup_test_workspace();
    let before = fs::read_to_string(workspace.path().join("app.py")).unwrap();

    let config = load_from_str(
        r#"
[meta]
workspace_relative = true

[[patches]]
id = "greet-hi"
file = "app.py"
search = "print(\"Hello\")"
replace = "print(\"Hi\")"
"#,
    )
    .unwrap();

    let results = check_patches(&config, workspace.path());
    assert!(matches!(results[0].1, Ok(PatchResult::Applied { .. })));

    let after = fs::read_to_string(workspace.path().join("app.py")).unwrap();
    assert_eq!(before, after);
}

#[test]
fn absolute_paths_honored_when_not_workspace_relative() {
    let workspace = setup_test_workspace();
    let absolute = workspace.path().join("config.ini");

    let toml = format!(
        r#"
[[patches]]
id = "abs"
file = "{}"
search = "port = 8080"
replace = "port = 9090"
"#,
        absolute.display()
    );
    let config = load_from_str(&toml).unwrap();

    // Workspace root deliberately elsewhere; the absolute path wins.
    let elsewhere = TempDir::new().unwrap();
    let results = apply_patches(&config, elsewhere.path());

    assert!(matches!(results[0].1, Ok(PatchResult::Applied { .. })));
    let content = fs::read_to_string(&absolute).unwrap();
    assert!(content.contains("9090"));
}

#[test]
fn patches_across_files_all_land() {
    let workspace = setup_test_workspace();

    let config = load_from_str(
        r#"
[meta]
workspace_relative = true

[[patches]]
id = "py"
file = "app.py"
search = "print(\"Goodbye\")"
replace = "print(\"See you\")"

[[patches]]
id = "ini"
file = "config.ini"
search = "host = localhost"
replace = "host = 0.0.0.0"
"#,
    )
    .unwrap();

    let results = apply_patches(&config, workspace.path());

    assert_eq!(results.len(), 2);
    assert!(results
        .iter()
        .all(|(_, r)| matches!(r, Ok(PatchResult::Applied { .. }))));
}
