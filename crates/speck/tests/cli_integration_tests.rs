//! CLI integration tests for speck commands

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;

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

/// Create a temp directory holding a git repo at `<temp>/app` with one commit
fn setup_test_git_repo() -> (tempfile::TempDir, PathBuf) {
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

fn speck(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_speck"))
        .args(args)
        .current_dir(dir)
        .env("SPECK_REQUIRED_DISK_MB", "1")
        .env_remove("SPECK_LOG")
        .output()
        .expect("failed to run speck")
}

fn json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout is not JSON ({}): {}\nstderr: {}",
            e,
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        )
    })
}

#[test]
fn test_no_command_prints_version() {
    let temp = tempfile::tempdir().unwrap();
    let output = speck(temp.path(), &[]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("speck v"));
}

#[test]
fn test_create_json() {
    let (_temp, repo) = setup_test_git_repo();
    git(&repo, &["branch", "feature/login"]);

    let output = speck(
        &repo,
        &["worktree", "create", "--branch", "feature/login", "--no-ide", "--json"],
    );
    assert!(
        output.status.success(),
        "create failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let response = json(&output);
    assert_eq!(response["success"], true);
    assert_eq!(response["command"], "worktree create");
    let metadata = &response["data"]["metadata"];
    assert_eq!(metadata["branchName"], "feature/login");
    assert_eq!(metadata["status"], "ready");

    let path = PathBuf::from(metadata["worktreePath"].as_str().unwrap());
    assert_eq!(path, repo.parent().unwrap().join("app-feature-login"));
    assert!(path.join("README.md").is_file());
}

#[test]
fn test_create_missing_branch_json_error() {
    let (temp, repo) = setup_test_git_repo();
    let entries_before = fs::read_dir(temp.path()).unwrap().count();

    let output = speck(&repo, &["worktree", "create", "--branch", "nope", "--json"]);
    assert_eq!(output.status.code(), Some(1));

    let response = json(&output);
    assert_eq!(response["success"], false);
    assert_eq!(response["code"], "E011");
    assert!(response["error"].as_str().unwrap().contains("nope"));
    assert!(response.get("data").is_none());
    assert_eq!(fs::read_dir(temp.path()).unwrap().count(), entries_before);
}

#[test]
fn test_create_missing_branch_human_error() {
    let (_temp, repo) = setup_test_git_repo();

    let output = speck(&repo, &["worktree", "create", "--branch", "nope"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("E011"), "stderr: {}", stderr);
}

#[test]
fn test_create_then_remove() {
    let (_temp, repo) = setup_test_git_repo();
    git(&repo, &["branch", "short-lived"]);

    let output = speck(&repo, &["worktree", "create", "--branch", "short-lived", "--quiet"]);
    assert!(output.status.success());
    let path = repo.parent().unwrap().join("app-short-lived");
    assert!(path.is_dir());

    let output = speck(
        &repo,
        &["worktree", "remove", "--branch", "short-lived", "--delete-branch", "--json"],
    );
    assert!(output.status.success());
    let response = json(&output);
    assert_eq!(response["data"]["branchDeleted"], true);
    assert!(!path.exists());
}

#[test]
fn test_create_from_linked_worktree_uses_main_repo() {
    let (_temp, repo) = setup_test_git_repo();
    git(&repo, &["branch", "first"]);
    git(&repo, &["branch", "second"]);
    let output = speck(&repo, &["worktree", "create", "--branch", "first", "--quiet"]);
    assert!(output.status.success());
    let linked = repo.parent().unwrap().join("app-first");

    let output = speck(
        &linked,
        &["worktree", "create", "--branch", "second", "--no-ide", "--json"],
    );
    assert!(
        output.status.success(),
        "create failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let metadata = &json(&output)["data"]["metadata"];
    assert_eq!(
        PathBuf::from(metadata["worktreePath"].as_str().unwrap()),
        repo.parent().unwrap().join("app-second")
    );
    assert_eq!(PathBuf::from(metadata["parentRepo"].as_str().unwrap()), repo);
}

#[test]
fn test_remove_unknown_branch() {
    let (_temp, repo) = setup_test_git_repo();

    let output = speck(&repo, &["worktree", "remove", "--branch", "ghost", "--json"]);
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(json(&output)["code"], "E014");
}

#[test]
fn test_init_defaults_writes_config() {
    let (_temp, repo) = setup_test_git_repo();

    let output = speck(&repo, &["worktree", "init", "--defaults", "--json"]);
    assert!(output.status.success());
    let response = json(&output);
    assert_eq!(response["data"]["source"], "recommended");

    let written: Value =
        serde_json::from_str(&fs::read_to_string(repo.join(".speck/config.json")).unwrap())
            .unwrap();
    assert_eq!(written["version"], "1.0");
    assert_eq!(written["worktree"]["enabled"], true);

    // A second run without a preset keeps the file.
    let output = speck(&repo, &["worktree", "init", "--json"]);
    assert!(output.status.success());
    assert_eq!(json(&output)["data"]["source"], "existing");
}

#[test]
fn test_init_presets_conflict() {
    let (_temp, repo) = setup_test_git_repo();

    let output = speck(&repo, &["worktree", "init", "--defaults", "--minimal"]);
    assert!(!output.status.success());
    assert!(!repo.join(".speck/config.json").exists());
}

#[test]
fn test_invalid_config_is_reported() {
    let (_temp, repo) = setup_test_git_repo();
    fs::create_dir(repo.join(".speck")).unwrap();
    fs::write(repo.join(".speck/config.json"), "{ not json").unwrap();
    git(&repo, &["branch", "feature"]);

    let output = speck(&repo, &["worktree", "create", "--branch", "feature", "--json"]);
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(json(&output)["code"], "E001");
}

#[test]
fn test_list_json() {
    let (_temp, repo) = setup_test_git_repo();
    git(&repo, &["branch", "listed"]);
    let output = speck(&repo, &["worktree", "create", "--branch", "listed", "--quiet"]);
    assert!(output.status.success());

    let output = speck(&repo, &["worktree", "list", "--json"]);
    assert!(output.status.success());
    let response = json(&output);
    let worktrees = response["data"]["worktrees"].as_array().unwrap();
    assert_eq!(worktrees.len(), 2);
    assert_eq!(worktrees[0]["branch"], "main");
    assert_eq!(worktrees[1]["branch"], "listed");
}

#[test]
fn test_prune_dry_run() {
    let (_temp, repo) = setup_test_git_repo();
    git(&repo, &["branch", "stale"]);
    let output = speck(&repo, &["worktree", "create", "--branch", "stale", "--quiet"]);
    assert!(output.status.success());
    fs::remove_dir_all(repo.parent().unwrap().join("app-stale")).unwrap();

    let output = speck(&repo, &["worktree", "prune", "--dry-run", "--json"]);
    assert!(output.status.success());
    let response = json(&output);
    assert_eq!(response["data"]["dryRun"], true);
    assert_eq!(response["data"]["prunedPaths"].as_array().unwrap().len(), 1);

    let output = speck(&repo, &["worktree", "list", "--json"]);
    assert_eq!(
        json(&output)["data"]["worktrees"].as_array().unwrap().len(),
        2
    );
}

#[test]
fn test_root_single_repo_json() {
    let (_temp, repo) = setup_test_git_repo();

    let output = speck(&repo, &["root", "--json"]);
    assert!(output.status.success());
    let response = json(&output);
    assert_eq!(response["data"]["mode"], "single-repo");
    assert_eq!(
        PathBuf::from(response["data"]["specsDir"].as_str().unwrap()),
        repo.join("specs")
    );
}

#[cfg(unix)]
#[test]
fn test_link_then_root_is_multi_repo() {
    let (temp, repo) = setup_test_git_repo();
    let shared = temp.path().canonicalize().unwrap().join("shared");
    fs::create_dir(&shared).unwrap();

    let output = speck(&repo, &["link", shared.to_str().unwrap(), "--json"]);
    assert!(
        output.status.success(),
        "link failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let output = speck(&repo, &["root", "--json"]);
    let response = json(&output);
    assert_eq!(response["data"]["mode"], "multi-repo");
    assert_eq!(
        PathBuf::from(response["data"]["speckRoot"].as_str().unwrap()),
        shared
    );
}
