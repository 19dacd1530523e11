use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use smart_patch::config::{
    apply_patches, check_patches, load_from_path, ApplicationError, PatchResult,
};
use smart_patch::edit::Edit;
use smart_patch::matcher::{FragmentMatch, MatchError, PatchRequest};
use smart_patch::read_patchable;
use smart_patch::safety::WorkspaceGuard;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "smart-patch")]
#[command(about = "Flexible search/replace patching for automated coding workflows", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Human-readable colored report
    Text,
    /// Machine-readable report for agent callers
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Patch a single file with one search/replace fragment
    Patch {
        /// File to patch (resolved against the workspace when relative)
        #[arg(short, long)]
        file: PathBuf,

        /// Search fragment given inline
        #[arg(short, long, conflicts_with = "search_file")]
        search: Option<String>,

        /// Read the search fragment from a file (multiline fragments)
        #[arg(long)]
        search_file: Option<PathBuf>,

        /// Replacement fragment given inline (empty string deletes the match)
        #[arg(short, long, conflicts_with = "replace_file")]
        replace: Option<String>,

        /// Read the replacement fragment from a file
        #[arg(long)]
        replace_file: Option<PathBuf>,

        /// Path to workspace root (auto-detected if not specified)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Dry run - show what would change without modifying the file
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,
    },

    /// Apply patch sets to a workspace
    Apply {
        /// Path to workspace root (auto-detected if not specified)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Specific patch set file to apply (otherwise applies all in patches/)
        #[arg(short, long)]
        patches: Option<PathBuf>,

        /// Dry run - show what would be changed without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,

        /// Report format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Check status of patch sets without applying
    Status {
        /// Path to workspace root (auto-detected if not specified)
        #[arg(short, long)]
        workspace: Option<PathBuf>,
    },

    /// Verify every patch is already applied to the workspace
    Verify {
        /// Path to workspace root (auto-detected if not specified)
        #[arg(short, long)]
        workspace: Option<PathBuf>,
    },

    /// List discovered patch sets and their patches
    List {
        /// Path to workspace root (auto-detected if not specified)
        #[arg(short, long)]
        workspace: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Patch {
            file,
            search,
            search_file,
            replace,
            replace_file,
            workspace,
            dry_run,
            diff,
        } => cmd_patch(
            file,
            fragment_arg(search, search_file, "search")?,
            fragment_arg(replace, replace_file, "replace")?,
            workspace,
            dry_run,
            diff,
        ),

        Commands::Apply {
            workspace,
            patches,
            dry_run,
            diff,
            format,
        } => cmd_apply(workspace, patches, dry_run, diff, format),

        Commands::Status { workspace } => cmd_status(workspace),

        Commands::Verify { workspace } => cmd_verify(workspace),

        Commands::List { workspace } => cmd_list(workspace),
    }
}

/// Resolve a fragment passed either inline or as a file path.
fn fragment_arg(
    inline: Option<String>,
    from_file: Option<PathBuf>,
    what: &str,
) -> Result<String> {
    match (inline, from_file) {
        (Some(text), None) => Ok(text),
        (None, Some(path)) => {
            fs::read_to_string(&path).map_err(|e| {
                anyhow::anyhow!("failed to read --{}-file {}: {}", what, path.display(), e)
            })
        }
        (None, None) => anyhow::bail!("either --{what} or --{what}-file is required"),
        // clap's conflicts_with rules this out
        (Some(_), Some(_)) => unreachable!(),
    }
}

/// Helper: Discover all .toml patch set files in a patches/ directory.
///
/// Discovery order:
/// 1. `<workspace>/patches` (allows keeping patch sets alongside the target).
/// 2. `./patches` relative to the current working directory (typical when
///    running from the repo that owns the patch sets).
fn discover_patch_files(workspace: &Path) -> Result<Vec<PathBuf>> {
    let cwd_patches_dir = env::current_dir().ok().map(|cwd| cwd.join("patches"));
    let workspace_patches_dir = workspace.join("patches");

    let candidate_dirs: Vec<PathBuf> = std::iter::once(workspace_patches_dir.clone())
        .chain(cwd_patches_dir)
        .collect();

    for patches_dir in candidate_dirs {
        if !patches_dir.exists() {
            continue;
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&patches_dir).max_depth(1) {
            let entry = entry?;
            if entry.file_type().is_file()
                && entry.path().extension().and_then(|s| s.to_str()) == Some("toml")
            {
                files.push(entry.path().to_path_buf());
            }
        }

        files.sort();

        if !files.is_empty() {
            return Ok(files);
        }
    }

    anyhow::bail!(
        "No .toml patch set files found in either ./patches or {}/patches",
        workspace.display()
    )
}

/// Resolve workspace path using multiple detection strategies
///
/// Priority order:
/// 1. Explicit --workspace flag
/// 2. SMART_PATCH_WORKSPACE environment variable
/// 3. Auto-detect the enclosing repository root from the current directory
fn resolve_workspace(cli_workspace: Option<PathBuf>) -> Result<PathBuf> {
    // 1. Explicit flag (highest priority)
    if let Some(path) = cli_workspace {
        return Ok(path.canonicalize()?);
    }

    // 2. Environment variable
    if let Ok(env_path) = env::var("SMART_PATCH_WORKSPACE") {
        let path = PathBuf::from(&env_path);
        if path.exists() {
            return Ok(path.canonicalize()?);
        }
        eprintln!(
            "{}",
            format!(
                "Warning: SMART_PATCH_WORKSPACE is set but path doesn't exist: {}",
                env_path
            )
            .yellow()
        );
    }

    // 3. Auto-detect from current directory
    if let Some(path) = auto_detect_workspace() {
        println!(
            "{}",
            format!("Auto-detected workspace: {}", path.display()).dimmed()
        );
        return Ok(path);
    }

    // 4. Helpful error with multiple solutions
    anyhow::bail!(
        "{}\n{}\n  {}\n  {}\n  {}",
        "Could not find a workspace.".red(),
        "Try one of:".bold(),
        "1. cd into the repository you want to patch and re-run",
        "2. Specify explicitly: smart-patch apply --workspace /path/to/repo",
        "3. Set environment variable: export SMART_PATCH_WORKSPACE=/path/to/repo"
    )
}

/// Auto-detect workspace by walking up to the nearest repository root
fn auto_detect_workspace() -> Option<PathBuf> {
    let current = env::current_dir().ok()?;

    for ancestor in current.ancestors() {
        if ancestor.join(".git").exists() {
            return Some(ancestor.to_path_buf());
        }
    }

    None
}

/// Helper: Show unified diff between original and modified content
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
}

fn cmd_patch(
    file: PathBuf,
    search: String,
    replace: String,
    workspace: Option<PathBuf>,
    dry_run: bool,
    show_diff: bool,
) -> Result<()> {
    let workspace = resolve_workspace(workspace)?;
    let guard = WorkspaceGuard::new(&workspace)?;
    let target = guard.validate_path(&file)?;

    let body = read_patchable(&target)?;

    let request = PatchRequest::new(body.clone(), search, replace)?;
    let patched = match request.apply() {
        Ok(patched) => patched,
        Err(e) => {
            eprintln!("{} {}", "✗".red(), e);
            match e {
                MatchError::NotFound => {
                    eprintln!("  {}", "Search fragment not found in target".red());
                    eprintln!("  File: {}", target.display());
                    eprintln!("  Possible causes:");
                    eprintln!("    - The text was already changed or removed");
                    eprintln!("    - The fragment spans tokens in a different order");
                    eprintln!("    - The fragment belongs to a different file");
                }
                MatchError::NoEffectiveChange => {
                    eprintln!(
                        "  {}",
                        "Replacement equals the matched text; nothing to do".red()
                    );
                    eprintln!("  Action: supply a replacement that differs from the match");
                }
                _ => {}
            }
            std::process::exit(1);
        }
    };

    if show_diff || dry_run {
        display_diff(&target, &body, &patched.body);
        println!();
    }

    if dry_run {
        println!(
            "{} Would apply ({}) to {}",
            "✓".green(),
            patched.strategy,
            target.display()
        );
        return Ok(());
    }

    // Re-check the path right before the write (TOCTOU window), then persist
    // through a verified edit so a file that changed since the match is
    // refused rather than clobbered.
    let target = guard.revalidate(&target)?;
    let found = FragmentMatch {
        byte_start: patched.byte_start,
        byte_end: patched.byte_end,
        strategy: patched.strategy,
    };
    let edit = Edit::from_fragment(&target, &body, found, request.replace());
    let _ = edit.apply()?;

    println!(
        "{} Applied ({}) to {}",
        "✓".green(),
        patched.strategy,
        target.display()
    );

    Ok(())
}

fn cmd_apply(
    workspace: Option<PathBuf>,
    patches: Option<PathBuf>,
    dry_run: bool,
    show_diff: bool,
    format: OutputFormat,
) -> Result<()> {
    // 1. Resolve workspace path
    let workspace = resolve_workspace(workspace)?;

    // 2. Determine patch set files to load
    let patch_files = if let Some(path) = patches {
        vec![path]
    } else {
        discover_patch_files(&workspace)?
    };

    let text = format == OutputFormat::Text;
    if text {
        println!("Workspace: {}", workspace.display());
        println!();
    }

    // 3. Load and apply each patch set
    let mut total_applied = 0;
    let mut total_already_applied = 0;
    let mut total_failed = 0;
    let mut json_entries = Vec::new();

    for patch_file in patch_files {
        if text {
            println!("Loading patch set from {}...", patch_file.display());
        }

        let config = load_from_path(&patch_file)?;

        // Capture file contents before applying (for diff output).
        // Only read files that the patches will touch.
        let mut file_contents_before: HashMap<PathBuf, String> = HashMap::new();
        if show_diff {
            let target_files: std::collections::HashSet<PathBuf> = config
                .patches
                .iter()
                .map(|p| {
                    if config.meta.workspace_relative {
                        workspace.join(&p.file)
                    } else {
                        PathBuf::from(&p.file)
                    }
                })
                .collect();
            for file_path in target_files {
                if let Ok(content) = fs::read_to_string(&file_path) {
                    file_contents_before.insert(file_path, content);
                }
            }
        }

        let results = if dry_run {
            if text {
                println!("{}", "  [DRY RUN - showing what would be applied]".cyan());
            }
            check_patches(&config, &workspace)
        } else {
            apply_patches(&config, &workspace)
        };

        // 4. Report results
        for (patch_id, result) in results {
            match &result {
                Ok(PatchResult::Applied { file, strategy }) => {
                    if text {
                        let verb = if dry_run { "Would apply" } else { "Applied" };
                        println!(
                            "{} {}: {} ({}) to {}",
                            "✓".green(),
                            patch_id,
                            verb,
                            strategy,
                            file.display()
                        );
                        if show_diff && !dry_run {
                            if let Some(before) = file_contents_before.get(file) {
                                if let Ok(after) = fs::read_to_string(file) {
                                    if before != &after {
                                        display_diff(file, before, &after);
                                    }
                                }
                            }
                        }
                    }
                    total_applied += 1;
                }
                Ok(PatchResult::AlreadyApplied { file }) => {
                    if text {
                        println!(
                            "{} {}: Already applied to {}",
                            "⊙".yellow(),
                            patch_id,
                            file.display()
                        );
                    }
                    total_already_applied += 1;
                }
                Ok(PatchResult::Failed { file, reason }) => {
                    if text {
                        eprintln!("{} {}: Failed - {}", "✗".red(), patch_id, reason);
                        eprintln!("  File: {}", file.display());
                    }
                    total_failed += 1;
                }
                Err(e) => {
                    if text {
                        eprintln!("{} {}: Error - {}", "✗".red(), patch_id, e);
                        explain_application_error(e);
                    }
                    total_failed += 1;
                }
            }

            if format == OutputFormat::Json {
                json_entries.push(result_to_json(&patch_id, &result, dry_run));
            }
        }

        if text {
            println!();
        }
    }

    // 5. Summary
    if text {
        println!("{}", "Summary:".bold());
        println!("  {} applied", format!("{}", total_applied).green());
        println!(
            "  {} already applied",
            format!("{}", total_already_applied).yellow()
        );
        println!("  {} failed", format!("{}", total_failed).red());
    } else {
        let report = serde_json::json!({
            "workspace": workspace,
            "dry_run": dry_run,
            "results": json_entries,
            "summary": {
                "applied": total_applied,
                "already_applied": total_already_applied,
                "failed": total_failed,
            },
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    if total_failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}

/// Per-error conflict diagnostics for the text report.
fn explain_application_error(e: &ApplicationError) {
    if let ApplicationError::Match {
        file,
        source,
        closest,
    } = e
    {
        match source {
            MatchError::NotFound => {
                eprintln!("  {}", "CONFLICT: search fragment not found".red());
                eprintln!("  File: {}", file.display());
                if let Some(line) = closest {
                    eprintln!("  Closest line: {:?}", line);
                }
                eprintln!("  Action: re-derive the search fragment from the current file");
            }
            MatchError::NoEffectiveChange => {
                eprintln!(
                    "  {}",
                    "CONFLICT: replacement equals the matched text".red()
                );
                eprintln!("  File: {}", file.display());
            }
            _ => {}
        }
    }
}

fn result_to_json(
    patch_id: &str,
    result: &Result<PatchResult, ApplicationError>,
    dry_run: bool,
) -> serde_json::Value {
    match result {
        Ok(PatchResult::Applied { file, strategy }) => serde_json::json!({
            "id": patch_id,
            "status": if dry_run { "would-apply" } else { "applied" },
            "file": file,
            "strategy": strategy.to_string(),
        }),
        Ok(PatchResult::AlreadyApplied { file }) => serde_json::json!({
            "id": patch_id,
            "status": "already-applied",
            "file": file,
        }),
        Ok(PatchResult::Failed { file, reason }) => serde_json::json!({
            "id": patch_id,
            "status": "failed",
            "file": file,
            "reason": reason,
        }),
        Err(e) => serde_json::json!({
            "id": patch_id,
            "status": "error",
            "reason": e.to_string(),
        }),
    }
}

fn cmd_status(workspace: Option<PathBuf>) -> Result<()> {
    // 1. Resolve workspace path
    let workspace = resolve_workspace(workspace)?;

    // 2. Discover patch set files
    let patch_files = discover_patch_files(&workspace)?;

    println!("{}", "Patch Status Report".bold());
    println!("Workspace: {}", workspace.display());
    println!();

    let mut applied = Vec::new();
    let mut not_applied = Vec::new();

    // 3. Check status of all patches (read-only; does not mutate workspace files)
    for patch_file in patch_files {
        let config = load_from_path(&patch_file)?;
        let results = check_patches(&config, &workspace);

        for (patch_id, result) in results {
            match result {
                Ok(PatchResult::Applied { .. }) => {
                    // Search fragment still present; patch has not landed yet.
                    not_applied.push((patch_id, "search fragment still present".to_string()));
                }
                Ok(PatchResult::AlreadyApplied { .. }) => {
                    applied.push(patch_id);
                }
                Ok(PatchResult::Failed { ref reason, .. }) => {
                    not_applied.push((patch_id, reason.clone()));
                }
                Err(ref e) => {
                    not_applied.push((patch_id, e.to_string()));
                }
            }
        }
    }

    // 4. Report grouped by status
    if !applied.is_empty() {
        println!(
            "{} {} ({} patches)",
            "✓".green(),
            "APPLIED".green().bold(),
            applied.len()
        );
        for id in &applied {
            println!("  - {}", id);
        }
        println!();
    }

    if !not_applied.is_empty() {
        println!(
            "{} {} ({} patches)",
            "⊙".yellow(),
            "NOT APPLIED".yellow().bold(),
            not_applied.len()
        );
        for (id, reason) in &not_applied {
            println!("  - {} ({})", id, reason.dimmed());
        }
        println!();
    }

    Ok(())
}

fn cmd_verify(workspace: Option<PathBuf>) -> Result<()> {
    // 1. Resolve workspace path
    let workspace = resolve_workspace(workspace)?;

    // 2. Discover patch set files
    let patch_files = discover_patch_files(&workspace)?;

    println!("{}", "Verifying patches...".bold());
    println!("Workspace: {}", workspace.display());
    println!();

    let mut verified = 0;
    let mut mismatch = 0;

    // 3. Check verification for all patches
    for patch_file in patch_files {
        let config = load_from_path(&patch_file)?;
        let results = check_patches(&config, &workspace);

        for (patch_id, result) in results {
            match result {
                Ok(PatchResult::AlreadyApplied { .. }) => {
                    println!("{} {}: Verified (already applied)", "✓".green(), patch_id);
                    verified += 1;
                }
                Ok(PatchResult::Applied { file, .. }) => {
                    eprintln!("{} {}: MISMATCH", "✗".red(), patch_id);
                    eprintln!("  Expected: patch already applied");
                    eprintln!("  Found: search fragment still present");
                    eprintln!("  Location: {}", file.display());
                    mismatch += 1;
                }
                Ok(PatchResult::Failed {
                    ref file,
                    ref reason,
                }) => {
                    eprintln!("{} {}: MISMATCH", "✗".red(), patch_id);
                    eprintln!("  Error: {}", reason);
                    eprintln!("  Location: {}", file.display());
                    mismatch += 1;
                }
                Err(ref e) => {
                    eprintln!("{} {}: MISMATCH", "✗".red(), patch_id);
                    eprintln!("  Error: {}", e);
                    mismatch += 1;
                }
            }
        }
    }

    println!();
    println!("{}", "Summary:".bold());
    println!("  {} verified", format!("{}", verified).green());
    println!("  {} mismatch", format!("{}", mismatch).red());

    if mismatch > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_list(workspace: Option<PathBuf>) -> Result<()> {
    let workspace = resolve_workspace(workspace)?;
    let patch_files = discover_patch_files(&workspace)?;

    for patch_file in patch_files {
        let config = load_from_path(&patch_file)?;

        println!("{}", patch_file.display().to_string().bold());
        if !config.meta.name.is_empty() {
            println!("  name: {}", config.meta.name);
        }
        if let Some(description) = &config.meta.description {
            println!("  description: {}", description.dimmed());
        }
        for patch in &config.patches {
            println!("  - {} ({})", patch.id, patch.file);
        }
        println!();
    }

    Ok(())
}
