//! Speck root detection for single- and multi-repository setups
//!
//! A repository can delegate its `specs/` directory to a shared "speck root"
//! through a `.speck/root` symlink. The speck root in turn marks each child
//! repository with a `.speck-link-<name>` symlink. Every symlink target is
//! checked against system locations before it is trusted.

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;

use crate::config::SPECK_DIR;
use crate::error::{GitError, SpeckError};
use crate::file_rules::create_symlink;
use crate::git::GitCli;

/// Name of the speck-root pointer inside `.speck/`
pub const ROOT_LINK: &str = "root";

/// Prefix of child-repository markers in a speck root
pub const CHILD_LINK_PREFIX: &str = ".speck-link-";

/// Directory holding spec files under a speck root
pub const SPECS_DIR: &str = "specs";

/// Targets denied outright
const DENIED_EXACT: &[&str] = &[
    "/var",
    "/tmp",
    "/home",
    "/Users",
    "/private/var",
    "/private/tmp",
];

/// Targets denied together with everything below them
const DENIED_PREFIXES: &[&str] = &[
    "/etc",
    "/usr",
    "/bin",
    "/sbin",
    "/sys",
    "/proc",
    "/dev",
    "/boot",
    "/lib",
    "/lib64",
    "/System",
    "/private/etc",
    "C:\\Windows",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpeckMode {
    SingleRepo,
    MultiRepo,
}

/// Where specs live for the current invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeckRootConfig {
    pub mode: SpeckMode,
    /// Equal to `repo_root` in single-repo mode
    pub speck_root: PathBuf,
    pub repo_root: PathBuf,
    /// `speck_root/specs`
    pub specs_dir: PathBuf,
}

impl SpeckRootConfig {
    fn single(repo_root: PathBuf) -> Self {
        Self {
            mode: SpeckMode::SingleRepo,
            specs_dir: repo_root.join(SPECS_DIR),
            speck_root: repo_root.clone(),
            repo_root,
        }
    }

    fn multi(speck_root: PathBuf, repo_root: PathBuf) -> Self {
        Self {
            mode: SpeckMode::MultiRepo,
            specs_dir: speck_root.join(SPECS_DIR),
            speck_root,
            repo_root,
        }
    }
}

/// Resolve `.` and `..` without touching the filesystem
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}

fn denial_reason(path: &Path, home: Option<&Path>) -> Option<String> {
    if path.parent().is_none() {
        return Some("points at a filesystem root".to_string());
    }
    if DENIED_EXACT.iter().any(|denied| path == Path::new(denied)) {
        return Some(format!("points at system directory {}", path.display()));
    }
    if let Some(prefix) = DENIED_PREFIXES
        .iter()
        .find(|prefix| path.starts_with(prefix))
    {
        return Some(format!("points inside system directory {}", prefix));
    }
    if let Some(home) = home {
        if home.ancestors().skip(1).any(|ancestor| ancestor == path) {
            return Some("points above the home directory".to_string());
        }
    }
    None
}

/// Refuse symlink targets in system locations or above `home`
///
/// Relative targets are resolved against the link's directory. Both the
/// lexical path and, when it exists, the canonical path are checked, so a
/// chain of links cannot smuggle a denied target through.
pub fn validate_symlink_target(
    link: &Path,
    target: &Path,
    home: Option<&Path>,
) -> Result<(), SpeckError> {
    let resolved = match link.parent() {
        Some(dir) if target.is_relative() => dir.join(target),
        _ => target.to_path_buf(),
    };

    let mut candidates = vec![normalize_lexically(&resolved)];
    if let Ok(canonical) = fs::canonicalize(&resolved) {
        candidates.push(canonical);
    }

    for candidate in &candidates {
        if let Some(reason) = denial_reason(candidate, home) {
            return Err(SpeckError::SymlinkSecurity {
                link: link.display().to_string(),
                target: target.display().to_string(),
                reason,
            });
        }
    }
    Ok(())
}

/// Git top-level directory containing `cwd`
pub fn find_repo_root(cwd: &Path) -> Option<PathBuf> {
    match GitCli::new(cwd).toplevel() {
        Ok(root) => Some(root),
        Err(e) => {
            tracing::debug!(cwd = %cwd.display(), error = %e, "not inside a git repository");
            None
        }
    }
}

/// Main repository for a linked worktree, or `repo_root` itself
///
/// A linked worktree's `.git` is a file reading
/// `gitdir: <main>/.git/worktrees/<name>`.
pub fn main_repo_root(repo_root: &Path) -> PathBuf {
    let dot_git = repo_root.join(".git");
    if !dot_git.is_file() {
        return repo_root.to_path_buf();
    }

    let Ok(content) = fs::read_to_string(&dot_git) else {
        return repo_root.to_path_buf();
    };
    let Some(gitdir) = content
        .lines()
        .find_map(|line| line.strip_prefix("gitdir:"))
        .map(|value| repo_root.join(value.trim()))
    else {
        return repo_root.to_path_buf();
    };

    let gitdir = normalize_lexically(&gitdir);
    let worktrees = gitdir.parent();
    match worktrees {
        Some(worktrees) if worktrees.file_name().is_some_and(|n| n == "worktrees") => worktrees
            .parent()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| repo_root.to_path_buf()),
        _ => repo_root.to_path_buf(),
    }
}

enum RootLink {
    Absent,
    NotSymlink,
    Target(PathBuf),
}

fn read_root_link(dir: &Path) -> Result<RootLink, SpeckError> {
    let link = dir.join(SPECK_DIR).join(ROOT_LINK);
    match fs::symlink_metadata(&link) {
        Err(_) => Ok(RootLink::Absent),
        Ok(meta) if !meta.file_type().is_symlink() => Ok(RootLink::NotSymlink),
        Ok(_) => {
            let target = fs::read_link(&link).map_err(|e| SpeckError::fs("read link", &link, e))?;
            Ok(RootLink::Target(target))
        }
    }
}

/// Validate a `.speck/root` target and resolve it to the speck root
fn resolve_root_link(dir: &Path, target: &Path, home: Option<&Path>) -> Result<PathBuf, SpeckError> {
    let link = dir.join(SPECK_DIR).join(ROOT_LINK);
    validate_symlink_target(&link, target, home)?;
    fs::canonicalize(&link).map_err(|_| SpeckError::BrokenSymlink {
        link: link.display().to_string(),
        target: target.display().to_string(),
    })
}

/// Whether `dir` carries at least one valid child-repository marker
fn has_child_links(dir: &Path, home: Option<&Path>) -> Result<bool, SpeckError> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Ok(false);
    };

    let mut found = false;
    for entry in entries.filter_map(Result::ok) {
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(CHILD_LINK_PREFIX) {
            continue;
        }
        if !entry.file_type().is_ok_and(|t| t.is_symlink()) {
            continue;
        }
        let link = entry.path();
        let target = fs::read_link(&link).map_err(|e| SpeckError::fs("read link", &link, e))?;
        validate_symlink_target(&link, &target, home)?;
        found = true;
    }
    Ok(found)
}

fn detect_from(cwd: &Path, home: Option<&Path>) -> Result<SpeckRootConfig, SpeckError> {
    let repo_root = find_repo_root(cwd);

    let mut candidates = vec![cwd.to_path_buf()];
    if let Some(root) = &repo_root {
        candidates.push(root.clone());
        candidates.push(main_repo_root(root));
    }
    candidates.dedup();

    for dir in &candidates {
        match read_root_link(dir)? {
            RootLink::Absent => continue,
            RootLink::NotSymlink => {
                tracing::warn!(
                    path = %dir.join(SPECK_DIR).join(ROOT_LINK).display(),
                    "speck root pointer is not a symlink, using single-repo mode"
                );
                let root = repo_root.clone().unwrap_or_else(|| dir.clone());
                return Ok(SpeckRootConfig::single(root));
            }
            RootLink::Target(target) => {
                let speck_root = resolve_root_link(dir, &target, home)?;
                let root = repo_root.clone().unwrap_or_else(|| dir.clone());
                tracing::debug!(speck_root = %speck_root.display(), "multi-repo mode");
                return Ok(SpeckRootConfig::multi(speck_root, root));
            }
        }
    }

    let root = repo_root.unwrap_or_else(|| cwd.to_path_buf());
    if has_child_links(&root, home)? {
        return Ok(SpeckRootConfig::multi(root.clone(), root));
    }
    Ok(SpeckRootConfig::single(root))
}

/// Speck root detection with a per-invocation cache
///
/// The first [`RootDetector::detect`] does the work; later calls return the
/// cached result until [`RootDetector::invalidate`] is called. Anything that
/// rewrites `.speck/root` must invalidate.
#[derive(Debug, Clone)]
pub struct RootDetector {
    cwd: PathBuf,
    home: Option<PathBuf>,
    cache: Option<SpeckRootConfig>,
}

impl RootDetector {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self::with_home(cwd, dirs::home_dir())
    }

    /// Use an explicit home directory for the above-home check
    pub fn with_home(cwd: impl Into<PathBuf>, home: Option<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            home,
            cache: None,
        }
    }

    pub fn detect(&mut self) -> Result<&SpeckRootConfig, SpeckError> {
        let config = match self.cache.take() {
            Some(config) => config,
            None => detect_from(&self.cwd, self.home.as_deref())?,
        };
        Ok(self.cache.insert(config))
    }

    pub fn invalidate(&mut self) {
        self.cache = None;
    }

    pub fn refresh(&mut self) -> Result<&SpeckRootConfig, SpeckError> {
        self.invalidate();
        self.detect()
    }

    pub fn is_cached(&self) -> bool {
        self.cache.is_some()
    }

    /// Point the current repository at `speck_root`
    ///
    /// Writes `.speck/root` in the repository and `.speck-link-<repo>` in the
    /// speck root, both relative, then re-detects.
    pub fn link(&mut self, speck_root: &Path) -> Result<&SpeckRootConfig, SpeckError> {
        let repo_root = find_repo_root(&self.cwd).ok_or_else(|| {
            SpeckError::git(
                "linking speck root",
                GitError::NotARepository {
                    path: self.cwd.display().to_string(),
                },
            )
        })?;
        let speck_root =
            fs::canonicalize(speck_root).map_err(|e| SpeckError::fs("resolve", speck_root, e))?;

        let speck_dir = repo_root.join(SPECK_DIR);
        let root_link = speck_dir.join(ROOT_LINK);
        if speck_root == repo_root {
            return Err(SpeckError::SymlinkSecurity {
                link: root_link.display().to_string(),
                target: speck_root.display().to_string(),
                reason: "the speck root cannot be the repository itself".to_string(),
            });
        }
        validate_symlink_target(&root_link, &speck_root, self.home.as_deref())?;

        fs::create_dir_all(&speck_dir)
            .map_err(|e| SpeckError::fs("create directory", &speck_dir, e))?;
        replace_link(&root_link, &speck_root, &speck_dir)?;

        let repo_name = repo_root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "repo".to_string());
        let child_link = speck_root.join(format!("{}{}", CHILD_LINK_PREFIX, repo_name));
        replace_link(&child_link, &repo_root, &speck_root)?;

        tracing::info!(
            repo = %repo_root.display(),
            speck_root = %speck_root.display(),
            "linked repository to speck root"
        );
        self.refresh()
    }
}

/// Create or replace a relative symlink at `link` in `link_dir`
fn replace_link(link: &Path, target: &Path, link_dir: &Path) -> Result<(), SpeckError> {
    match fs::symlink_metadata(link) {
        Ok(meta) if meta.file_type().is_symlink() => {
            fs::remove_file(link).map_err(|e| SpeckError::fs("remove", link, e))?;
        }
        Ok(_) => {
            return Err(SpeckError::PathOccupied {
                path: link.display().to_string(),
            });
        }
        Err(_) => {}
    }

    let relative = pathdiff::diff_paths(target, link_dir).unwrap_or_else(|| target.to_path_buf());
    create_symlink(&relative, link, true).map_err(|e| SpeckError::fs("create symlink", link, e))
}

/// One-shot detection from `cwd`
pub fn detect_speck_root(cwd: &Path) -> Result<SpeckRootConfig, SpeckError> {
    RootDetector::new(cwd).detect().cloned()
}
