//! Integration tests for the worktree lifecycle against real git repositories

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use speck_core::config::{FileAction, FileRule, PackageManagerPreference};
use speck_core::file_rules::apply_file_rules;
use speck_core::{
    CreateWorktreeOptions, ErrorCategory, Progress, RemoveWorktreeOptions, SpeckConfig,
    SpeckError, WorktreeMetadata, WorktreeStatus, create_worktree, list_worktrees, load_config,
    main_repository, prune_worktrees, remove_worktree, save_config,
};

fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Temp directory holding a repository at `<temp>/app` with one commit on main
fn setup_repo() -> (tempfile::TempDir, PathBuf) {
    let temp = tempfile::tempdir().expect("failed to create temp dir");
    let repo = temp.path().join("app");
    fs::create_dir(&repo).expect("failed to create repo dir");

    git(&repo, &["init", "-b", "main"]);
    git(&repo, &["config", "user.name", "Test User"]);
    git(&repo, &["config", "user.email", "test@example.com"]);
    git(&repo, &["config", "commit.gpgsign", "false"]);

    fs::write(repo.join("README.md"), "# app\n").expect("failed to write readme");
    git(&repo, &["add", "."]);
    git(&repo, &["commit", "-m", "Initial commit"]);

    let repo = repo.canonicalize().expect("failed to canonicalize repo");
    (temp, repo)
}

fn options(repo: &Path, branch: &str) -> CreateWorktreeOptions {
    let mut options = CreateWorktreeOptions::new(repo, branch);
    options.skip_ide = true;
    options.skip_deps = true;
    options.required_disk_mb = 1;
    options
}

fn sibling(repo: &Path, name: &str) -> PathBuf {
    repo.parent().expect("repo has a parent").join(name)
}

#[test]
fn test_create_worktree_for_existing_branch() {
    let (_temp, repo) = setup_repo();
    git(&repo, &["branch", "feature/login"]);

    let outcome = create_worktree(&options(&repo, "feature/login"), &Progress::silent())
        .expect("create should succeed");

    let expected = sibling(&repo, "app-feature-login");
    assert_eq!(outcome.metadata.worktree_path, expected);
    assert_eq!(outcome.metadata.branch_name, "feature/login");
    assert_eq!(outcome.metadata.parent_repo, repo);
    assert_eq!(outcome.metadata.status, WorktreeStatus::Ready);
    assert!(outcome.warnings.is_empty());
    assert!(outcome.install.is_none());
    assert!(outcome.ide.is_none());
    assert!(expected.join("README.md").is_file());

    let listed = list_worktrees(&repo);
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[1].branch.as_deref(), Some("feature/login"));
}

#[test]
fn test_duplicate_create_is_rejected() {
    let (temp, repo) = setup_repo();
    git(&repo, &["branch", "feature-x"]);

    create_worktree(&options(&repo, "feature-x"), &Progress::silent())
        .expect("first create should succeed");
    let entries_before = fs::read_dir(temp.path()).unwrap().count();

    let err = create_worktree(&options(&repo, "feature-x"), &Progress::silent())
        .expect_err("second create should fail");
    assert_eq!(err.code(), "E012");
    assert_eq!(fs::read_dir(temp.path()).unwrap().count(), entries_before);
}

#[test]
fn test_missing_branch_creates_nothing() {
    let (_temp, repo) = setup_repo();

    let err = create_worktree(&options(&repo, "does-not-exist"), &Progress::silent())
        .expect_err("create should fail");
    assert_eq!(err.code(), "E011");
    assert!(!sibling(&repo, "app-does-not-exist").exists());
    assert_eq!(list_worktrees(&repo).len(), 1);
}

#[test]
fn test_invalid_branch_name_is_rejected() {
    let (_temp, repo) = setup_repo();

    let err = create_worktree(&options(&repo, "bad..name"), &Progress::silent())
        .expect_err("create should fail");
    assert_eq!(err.code(), "E010");
}

#[test]
fn test_occupied_destination_is_rejected() {
    let (_temp, repo) = setup_repo();
    git(&repo, &["branch", "busy"]);
    let dest = sibling(&repo, "app-busy");
    fs::create_dir(&dest).unwrap();
    fs::write(dest.join("notes.txt"), "keep me").unwrap();

    let err = create_worktree(&options(&repo, "busy"), &Progress::silent())
        .expect_err("create should fail");
    assert_eq!(err.code(), "E013");
    assert_eq!(fs::read_to_string(dest.join("notes.txt")).unwrap(), "keep me");
}

#[test]
fn test_reuse_keeps_existing_files() {
    let (_temp, repo) = setup_repo();
    git(&repo, &["branch", "reuse-me"]);
    let dest = sibling(&repo, "app-reuse-me");
    fs::create_dir(&dest).unwrap();
    fs::write(dest.join("notes.txt"), "keep me").unwrap();

    let mut opts = options(&repo, "reuse-me");
    opts.reuse_existing = true;
    let outcome = create_worktree(&opts, &Progress::silent()).expect("reuse should succeed");

    assert_eq!(outcome.metadata.worktree_path, dest);
    assert!(dest.join("README.md").is_file());
    assert_eq!(fs::read_to_string(dest.join("notes.txt")).unwrap(), "keep me");
}

#[test]
fn test_force_replaces_occupied_destination() {
    let (_temp, repo) = setup_repo();
    git(&repo, &["branch", "forced"]);
    let dest = sibling(&repo, "app-forced");
    fs::create_dir(&dest).unwrap();
    fs::write(dest.join("stale.txt"), "old").unwrap();

    let mut opts = options(&repo, "forced");
    opts.force = true;
    let outcome =
        create_worktree(&opts, &Progress::silent()).expect("forced create should succeed");

    assert_eq!(outcome.metadata.worktree_path, dest);
    assert_eq!(outcome.metadata.status, WorktreeStatus::Ready);
    assert!(dest.join("README.md").is_file());
    assert!(!dest.join("stale.txt").exists());
}

#[test]
fn test_create_from_inside_linked_worktree() {
    let (_temp, repo) = setup_repo();
    git(&repo, &["branch", "first"]);
    git(&repo, &["branch", "second"]);
    let first = create_worktree(&options(&repo, "first"), &Progress::silent()).unwrap();
    let linked = first.metadata.worktree_path;

    assert_eq!(main_repository(&linked).unwrap(), repo);

    let second = create_worktree(&options(&linked, "second"), &Progress::silent())
        .expect("create from a linked worktree should succeed");
    assert_eq!(second.metadata.worktree_path, sibling(&repo, "app-second"));
    assert_eq!(second.metadata.parent_repo, repo);
    assert!(!sibling(&repo, "app-first-second").exists());
}

#[test]
fn test_failed_install_keeps_worktree() {
    let (_temp, repo) = setup_repo();
    git(&repo, &["branch", "no-manifest"]);

    let mut config = SpeckConfig::recommended();
    config.worktree.dependencies.auto_install = true;
    config.worktree.dependencies.package_manager = PackageManagerPreference::Npm;
    save_config(&repo, &config).unwrap();

    let mut opts = options(&repo, "no-manifest");
    opts.skip_deps = false;
    let err = create_worktree(&opts, &Progress::silent()).expect_err("install should fail");

    assert_eq!(err.code(), "E040");
    assert_eq!(err.category(), ErrorCategory::Fatal);
    let SpeckError::WorktreeIncomplete { source, .. } = &err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(source.code(), "E022");

    let dest = sibling(&repo, "app-no-manifest");
    assert!(dest.join("README.md").is_file());
    let listed = list_worktrees(&repo);
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[1].branch.as_deref(), Some("no-manifest"));

    let metadata = WorktreeMetadata::from_incomplete(&err, &repo).expect("metadata for E040");
    assert_eq!(metadata.status, WorktreeStatus::Failed);
    assert_eq!(metadata.worktree_path, dest);
    assert_eq!(metadata.branch_name, "no-manifest");
}

#[test]
fn test_branch_prefix_from_config() {
    let (_temp, repo) = setup_repo();
    git(&repo, &["branch", "alice/search"]);

    let mut config = SpeckConfig::recommended();
    config.worktree.branch_prefix = Some("alice/".to_string());
    save_config(&repo, &config).unwrap();

    let outcome = create_worktree(&options(&repo, "search"), &Progress::silent())
        .expect("prefixed create should succeed");
    assert_eq!(outcome.metadata.branch_name, "alice/search");
    assert_eq!(outcome.metadata.worktree_path, sibling(&repo, "app-alice-search"));

    // Removal accepts the unprefixed name too.
    let removed = remove_worktree(&RemoveWorktreeOptions::new(&repo, "search"), &Progress::silent())
        .expect("remove should succeed");
    assert_eq!(removed.branch_name, "alice/search");
}

#[test]
fn test_remove_worktree_and_branch() {
    let (_temp, repo) = setup_repo();
    git(&repo, &["branch", "cleanup"]);
    let created = create_worktree(&options(&repo, "cleanup"), &Progress::silent()).unwrap();

    let mut opts = RemoveWorktreeOptions::new(&repo, "cleanup");
    opts.delete_branch = true;
    let outcome = remove_worktree(&opts, &Progress::silent()).expect("remove should succeed");

    assert_eq!(outcome.worktree_path, created.metadata.worktree_path);
    assert!(outcome.branch_deleted);
    assert!(!outcome.used_fallback);
    assert!(outcome.warnings.is_empty());
    assert!(!created.metadata.worktree_path.exists());
    assert_eq!(list_worktrees(&repo).len(), 1);

    let branches = Command::new("git")
        .args(["branch", "--list", "cleanup"])
        .current_dir(&repo)
        .output()
        .unwrap();
    assert!(String::from_utf8_lossy(&branches.stdout).trim().is_empty());
}

#[test]
fn test_remove_falls_back_when_git_refuses() {
    let (_temp, repo) = setup_repo();
    git(&repo, &["branch", "dirty"]);
    let created = create_worktree(&options(&repo, "dirty"), &Progress::silent()).unwrap();
    let dest = created.metadata.worktree_path;
    // Local changes make `git worktree remove` refuse without --force.
    fs::write(dest.join("README.md"), "# edited\n").unwrap();
    fs::write(dest.join("scratch.txt"), "untracked").unwrap();

    let outcome = remove_worktree(&RemoveWorktreeOptions::new(&repo, "dirty"), &Progress::silent())
        .expect("remove should fall back");

    assert!(outcome.used_fallback);
    assert_eq!(outcome.worktree_path, dest);
    assert!(!dest.exists());
    assert_eq!(list_worktrees(&repo).len(), 1);
}

#[test]
fn test_remove_unknown_branch_touches_nothing() {
    let (temp, repo) = setup_repo();
    let entries_before = fs::read_dir(temp.path()).unwrap().count();

    let err = remove_worktree(&RemoveWorktreeOptions::new(&repo, "nope"), &Progress::silent())
        .expect_err("remove should fail");
    assert_eq!(err.code(), "E014");
    assert_eq!(fs::read_dir(temp.path()).unwrap().count(), entries_before);
}

#[test]
fn test_remove_refuses_main_worktree() {
    let (_temp, repo) = setup_repo();

    let err = remove_worktree(&RemoveWorktreeOptions::new(&repo, "main"), &Progress::silent())
        .expect_err("removing the main worktree should fail");
    assert_eq!(err.code(), "E015");
    assert!(repo.join("README.md").is_file());
}

#[test]
fn test_prune_dry_run_then_prune() {
    let (_temp, repo) = setup_repo();
    git(&repo, &["branch", "stale"]);
    let created = create_worktree(&options(&repo, "stale"), &Progress::silent()).unwrap();
    fs::remove_dir_all(&created.metadata.worktree_path).unwrap();

    let dry = prune_worktrees(&repo, true).expect("dry run should succeed");
    assert!(dry.dry_run);
    assert_eq!(dry.pruned_paths, vec![created.metadata.worktree_path.clone()]);
    assert_eq!(list_worktrees(&repo).len(), 2);

    let pruned = prune_worktrees(&repo, false).expect("prune should succeed");
    assert_eq!(pruned.pruned_paths.len(), 1);
    assert_eq!(list_worktrees(&repo).len(), 1);
}

#[test]
fn test_file_rules_copy_and_ignore() {
    let (temp, repo) = setup_repo();
    fs::write(repo.join("a.json"), "{}").unwrap();
    fs::write(repo.join("secrets.json"), "{\"token\":1}").unwrap();
    fs::write(repo.join("b.txt"), "text").unwrap();
    git(&repo, &["add", "."]);
    git(&repo, &["commit", "-m", "Add files"]);

    let dest = temp.path().join("dest");
    fs::create_dir(&dest).unwrap();
    let rules = vec![
        FileRule::new("*.json", FileAction::Copy),
        FileRule::new("secrets.json", FileAction::Ignore),
    ];

    let outcome = apply_file_rules(&repo, &dest, &rules, false, &Progress::silent()).unwrap();
    assert_eq!(outcome.copied, vec!["a.json".to_string()]);
    assert!(outcome.failures.is_empty());
    assert!(dest.join("a.json").is_file());
    assert!(!dest.join("secrets.json").exists());
    assert!(!dest.join("b.txt").exists());
}

#[test]
fn test_untracked_env_file_is_copied_into_worktree() {
    let (_temp, repo) = setup_repo();
    git(&repo, &["branch", "env"]);
    fs::write(repo.join(".env"), "API_KEY=local\n").unwrap();

    save_config(&repo, &SpeckConfig::recommended()).unwrap();
    let outcome = create_worktree(&options(&repo, "env"), &Progress::silent()).unwrap();

    assert!(outcome.file_rules.copied.contains(&".env".to_string()));
    assert_eq!(
        fs::read_to_string(outcome.metadata.worktree_path.join(".env")).unwrap(),
        "API_KEY=local\n"
    );
}

#[test]
fn test_config_round_trip() {
    let (_temp, repo) = setup_repo();
    let mut config = SpeckConfig::minimal();
    config.worktree.worktree_path = "{repo}--{branch}".to_string();
    config.worktree.files.rules = vec![FileRule::new("config/*.yml", FileAction::Copy)];

    save_config(&repo, &config).unwrap();
    let loaded = load_config(&repo).unwrap();
    assert_eq!(loaded, config);
}
