//! Package manager detection and dependency installation
//!
//! Installation runs the package manager as a child process. Output is
//! streamed line by line to the progress channel while it runs, and a
//! failure is classified from the collected text so the caller can say
//! something more useful than "exit status 1".

use std::collections::VecDeque;
use std::fmt;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::PackageManagerPreference;
pub use crate::error::InstallFailureKind;
use crate::error::SpeckError;
use crate::progress::{OutputStream, Progress, ProgressEvent};

/// Lines of installer output kept for error reports
const OUTPUT_TAIL_LINES: usize = 40;

/// A concrete package manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    Npm,
    Yarn,
    Pnpm,
    Bun,
}

impl PackageManager {
    pub fn command(&self) -> &'static str {
        match self {
            PackageManager::Npm => "npm",
            PackageManager::Yarn => "yarn",
            PackageManager::Pnpm => "pnpm",
            PackageManager::Bun => "bun",
        }
    }

    pub fn install_args(&self) -> &'static [&'static str] {
        &["install"]
    }

    /// Lockfiles that identify this package manager
    pub fn lockfiles(&self) -> &'static [&'static str] {
        match self {
            PackageManager::Bun => &["bun.lockb", "bun.lock"],
            PackageManager::Pnpm => &["pnpm-lock.yaml"],
            PackageManager::Yarn => &["yarn.lock"],
            PackageManager::Npm => &["package-lock.json"],
        }
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command())
    }
}

/// Lockfile priority: bun, pnpm, yarn, npm
const DETECTION_ORDER: [PackageManager; 4] = [
    PackageManager::Bun,
    PackageManager::Pnpm,
    PackageManager::Yarn,
    PackageManager::Npm,
];

/// Detect the package manager from lockfiles, defaulting to npm
pub fn detect_package_manager(project_dir: &Path) -> PackageManager {
    DETECTION_ORDER
        .into_iter()
        .find(|pm| {
            pm.lockfiles()
                .iter()
                .any(|lockfile| project_dir.join(lockfile).is_file())
        })
        .unwrap_or(PackageManager::Npm)
}

/// Resolve a config preference to a concrete package manager
pub fn resolve_package_manager(
    project_dir: &Path,
    preference: PackageManagerPreference,
) -> PackageManager {
    match preference {
        PackageManagerPreference::Npm => PackageManager::Npm,
        PackageManagerPreference::Yarn => PackageManager::Yarn,
        PackageManagerPreference::Pnpm => PackageManager::Pnpm,
        PackageManagerPreference::Bun => PackageManager::Bun,
        PackageManagerPreference::Auto => detect_package_manager(project_dir),
    }
}

/// Result of a successful install
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallOutcome {
    pub package_manager: PackageManager,
    #[serde(serialize_with = "serialize_millis")]
    pub duration: Duration,
}

fn serialize_millis<S: serde::Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(duration.as_millis() as u64)
}

/// A classified installer failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpretedInstallError {
    pub kind: InstallFailureKind,
    pub message: &'static str,
    pub suggestion: &'static str,
}

impl InterpretedInstallError {
    fn of(kind: InstallFailureKind) -> Self {
        let (message, suggestion) = match kind {
            InstallFailureKind::PackageManagerMissing => (
                "the package manager is not installed or not on PATH",
                "install it, or set worktree.dependencies.packageManager in .speck/config.json",
            ),
            InstallFailureKind::MissingManifest => (
                "package.json was not found in the worktree",
                "make sure package.json is committed, or disable dependencies.autoInstall",
            ),
            InstallFailureKind::PermissionDenied => (
                "the package manager was denied access to a file or directory",
                "check ownership of the worktree and the package manager cache directory",
            ),
            InstallFailureKind::DiskSpace => (
                "the disk ran out of space during installation",
                "free up disk space and run the install again inside the worktree",
            ),
            InstallFailureKind::Network => (
                "a network request to the package registry failed",
                "check your internet connection, proxy and registry settings, then retry",
            ),
            InstallFailureKind::RegistryNotFound => (
                "a package could not be found in the registry",
                "check dependency names and versions in package.json and your registry configuration",
            ),
            InstallFailureKind::MalformedManifest => (
                "package.json could not be parsed",
                "fix the JSON syntax in package.json",
            ),
            InstallFailureKind::Unknown => (
                "the package manager exited with an error",
                "run the install manually inside the worktree to see the full output",
            ),
        };
        InterpretedInstallError {
            kind,
            message,
            suggestion,
        }
    }

    fn into_error(self, output: String) -> SpeckError {
        SpeckError::DependencyInstall {
            kind: self.kind,
            message: self.message.to_string(),
            suggestion: self.suggestion.to_string(),
            output,
        }
    }
}

const MISSING_PHRASES: [&str; 6] = [
    "enoent",
    "no such file",
    "not found",
    "couldn't find",
    "could not read",
    "no package.json",
];

/// True when a line reports the project's own package.json as missing
///
/// A missing manifest inside `node_modules` or a nested workspace package
/// is a broken dependency, not a missing project manifest.
fn reports_missing_root_manifest(text: &str, project_dir: &Path) -> bool {
    let dir = project_dir.to_string_lossy().to_lowercase();
    let manifest = project_dir.join("package.json").to_string_lossy().to_lowercase();
    let quoted_dirs = [format!("\"{}\"", dir), format!("'{}'", dir)];

    text.lines().any(|line| {
        !line.contains("node_modules")
            && line.contains("package.json")
            && MISSING_PHRASES.iter().any(|phrase| line.contains(phrase))
            && (line.contains(&manifest) || quoted_dirs.iter().any(|q| line.contains(q.as_str())))
    })
}

fn reports_missing_program(text: &str) -> bool {
    text.contains("command not found")
        || text.contains("is not recognized as an internal or external command")
        || text
            .lines()
            .any(|line| line.contains("spawn ") && line.contains("enoent"))
}

/// Classify raw installer or spawn error text by keyword
///
/// `project_dir` anchors the missing-manifest check to the top-level
/// `package.json`.
pub fn interpret_install_error(raw: &str, project_dir: &Path) -> InterpretedInstallError {
    let text = raw.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|needle| text.contains(needle));

    let kind = if reports_missing_program(&text) {
        InstallFailureKind::PackageManagerMissing
    } else if reports_missing_root_manifest(&text, project_dir) {
        InstallFailureKind::MissingManifest
    } else if has(&["eacces", "eperm", "permission denied", "operation not permitted"]) {
        InstallFailureKind::PermissionDenied
    } else if has(&["enospc", "no space left on device", "disk quota exceeded"]) {
        InstallFailureKind::DiskSpace
    } else if has(&[
        "etimedout",
        "econnrefused",
        "econnreset",
        "enotfound",
        "eai_again",
        "getaddrinfo",
        "network",
        "socket hang up",
    ]) {
        InstallFailureKind::Network
    } else if has(&["e404", "404 not found", "not found in the registry", "404"]) {
        InstallFailureKind::RegistryNotFound
    } else if has(&[
        "ejsonparse",
        "unexpected token",
        "invalid package.json",
        "failed to parse package.json",
        "json parse",
        "unexpected end of json",
    ]) {
        InstallFailureKind::MalformedManifest
    } else {
        InstallFailureKind::Unknown
    };

    InterpretedInstallError::of(kind)
}

/// Forward each line of `reader` to the progress channel, returning the tail
///
/// Bytes that are not valid UTF-8 are replaced rather than ending the read,
/// so the child never sees its pipe closed early.
fn pump_lines<R: Read>(reader: R, stream: OutputStream, progress: &Progress) -> VecDeque<String> {
    let mut reader = BufReader::new(reader);
    let mut tail = VecDeque::with_capacity(OUTPUT_TAIL_LINES + 1);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::debug!(error = %e, "installer output stream closed");
                break;
            }
        }
        let line = String::from_utf8_lossy(&buf)
            .trim_end_matches(['\n', '\r'])
            .to_string();
        progress.emit(ProgressEvent::InstallOutput {
            stream,
            line: line.clone(),
        });
        tail.push_back(line);
        if tail.len() > OUTPUT_TAIL_LINES {
            tail.pop_front();
        }
    }
    tail
}

/// Run `<pm> install` in `project_dir`, streaming output to `progress`
///
/// A missing `package.json` fails before anything is spawned.
pub fn install_dependencies(
    project_dir: &Path,
    package_manager: PackageManager,
    progress: &Progress,
) -> Result<InstallOutcome, SpeckError> {
    let mut command = Command::new(package_manager.command());
    command.args(package_manager.install_args());
    run_installer(command, project_dir, package_manager, progress)
}

fn run_installer(
    mut command: Command,
    project_dir: &Path,
    package_manager: PackageManager,
    progress: &Progress,
) -> Result<InstallOutcome, SpeckError> {
    if !project_dir.join("package.json").is_file() {
        return Err(InterpretedInstallError::of(InstallFailureKind::MissingManifest)
            .into_error(format!("{} has no package.json", project_dir.display())));
    }

    tracing::debug!(pm = %package_manager, dir = %project_dir.display(), "installing dependencies");
    progress.emit(ProgressEvent::InstallStarted { package_manager });
    let started = Instant::now();

    let spawned = command
        .current_dir(project_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn();

    let mut child = match spawned {
        Ok(child) => child,
        Err(e) => {
            progress.emit(ProgressEvent::InstallFinished { success: false });
            if e.kind() == std::io::ErrorKind::NotFound {
                return Err(
                    InterpretedInstallError::of(InstallFailureKind::PackageManagerMissing)
                        .into_error(format!("spawn {} ENOENT", package_manager)),
                );
            }
            let raw = e.to_string();
            return Err(interpret_install_error(&raw, project_dir).into_error(raw));
        }
    };

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let (stdout_tail, stderr_tail) = std::thread::scope(|scope| {
        let out = scope.spawn(|| {
            stdout
                .map(|s| pump_lines(s, OutputStream::Stdout, progress))
                .unwrap_or_default()
        });
        let err = scope.spawn(|| {
            stderr
                .map(|s| pump_lines(s, OutputStream::Stderr, progress))
                .unwrap_or_default()
        });
        (
            out.join().unwrap_or_default(),
            err.join().unwrap_or_default(),
        )
    });

    let status = child.wait().map_err(|e| {
        progress.emit(ProgressEvent::InstallFinished { success: false });
        let raw = e.to_string();
        interpret_install_error(&raw, project_dir).into_error(raw)
    })?;

    progress.emit(ProgressEvent::InstallFinished {
        success: status.success(),
    });

    if !status.success() {
        let output = stderr_tail
            .iter()
            .chain(stdout_tail.iter())
            .cloned()
            .collect::<Vec<_>>()
            .join("\n");
        let raw = format!("{}\n{}", output, status);
        return Err(interpret_install_error(&raw, project_dir).into_error(output));
    }

    Ok(InstallOutcome {
        package_manager,
        duration: started.elapsed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_detect_package_manager_priority() {
        let temp = tempfile::tempdir().unwrap();
        assert_eq!(detect_package_manager(temp.path()), PackageManager::Npm);

        fs::write(temp.path().join("package-lock.json"), "{}").unwrap();
        assert_eq!(detect_package_manager(temp.path()), PackageManager::Npm);

        fs::write(temp.path().join("yarn.lock"), "").unwrap();
        assert_eq!(detect_package_manager(temp.path()), PackageManager::Yarn);

        fs::write(temp.path().join("pnpm-lock.yaml"), "").unwrap();
        assert_eq!(detect_package_manager(temp.path()), PackageManager::Pnpm);

        fs::write(temp.path().join("bun.lockb"), "").unwrap();
        assert_eq!(detect_package_manager(temp.path()), PackageManager::Bun);
    }

    #[test]
    fn test_detect_pnpm_only() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("pnpm-lock.yaml"), "").unwrap();
        assert_eq!(detect_package_manager(temp.path()), PackageManager::Pnpm);
    }

    #[test]
    fn test_resolve_preference() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("yarn.lock"), "").unwrap();
        assert_eq!(
            resolve_package_manager(temp.path(), PackageManagerPreference::Auto),
            PackageManager::Yarn
        );
        assert_eq!(
            resolve_package_manager(temp.path(), PackageManagerPreference::Bun),
            PackageManager::Bun
        );
    }

    #[test]
    fn test_interpret_install_error() {
        let project = Path::new("/w");
        let cases = [
            (
                "npm ERR! enoent ENOENT: no such file or directory, open '/w/package.json'",
                InstallFailureKind::MissingManifest,
            ),
            (
                "error Couldn't find a package.json file in \"/w\"",
                InstallFailureKind::MissingManifest,
            ),
            ("npm ERR! code EACCES", InstallFailureKind::PermissionDenied),
            ("ENOSPC: no space left on device, write", InstallFailureKind::DiskSpace),
            (
                "npm ERR! network request to https://registry.npmjs.org failed, reason: getaddrinfo ENOTFOUND",
                InstallFailureKind::Network,
            ),
            (
                "npm ERR! 404 Not Found - GET https://registry.npmjs.org/nope",
                InstallFailureKind::RegistryNotFound,
            ),
            (
                "npm ERR! code EJSONPARSE\nnpm ERR! JSON.parse Unexpected token",
                InstallFailureKind::MalformedManifest,
            ),
            ("something odd happened", InstallFailureKind::Unknown),
        ];
        for (raw, expected) in cases {
            assert_eq!(interpret_install_error(raw, project).kind, expected, "{}", raw);
        }
    }

    #[test]
    fn test_missing_program_is_reported_as_such() {
        let project = Path::new("/w");
        for raw in [
            "npm is not installed (spawn npm ENOENT)",
            "Error: spawn pnpm ENOENT",
            "sh: yarn: command not found",
        ] {
            let interpreted = interpret_install_error(raw, project);
            assert_eq!(interpreted.kind, InstallFailureKind::PackageManagerMissing, "{}", raw);
            assert!(interpreted.message.contains("not installed"));
        }
    }

    #[test]
    fn test_nested_manifest_is_not_missing_project_manifest() {
        let project = Path::new("/w");
        for raw in [
            "npm ERR! enoent ENOENT: no such file or directory, open '/w/node_modules/left-pad/package.json'",
            "npm ERR! enoent ENOENT: no such file or directory, open '/w/packages/api/package.json'",
            "npm ERR! enoent ENOENT: no such file or directory, open '/elsewhere/package.json'",
        ] {
            assert_ne!(
                interpret_install_error(raw, project).kind,
                InstallFailureKind::MissingManifest,
                "{}",
                raw
            );
        }
    }

    #[test]
    fn test_missing_executable_fails_without_output() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("package.json"), "{}").unwrap();

        let command = Command::new(temp.path().join("no-such-installer"));
        let err = run_installer(command, temp.path(), PackageManager::Pnpm, &Progress::silent())
            .unwrap_err();
        assert!(matches!(
            err,
            SpeckError::DependencyInstall {
                kind: InstallFailureKind::PackageManagerMissing,
                ..
            }
        ));
    }

    /// A shell script standing in for the package manager
    #[cfg(unix)]
    fn fake_installer(dir: &Path, body: &str) -> Command {
        let script = dir.join("fake-npm.sh");
        fs::write(&script, format!("{}\n", body)).unwrap();
        let mut command = Command::new("sh");
        command.arg(script);
        command
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_output_does_not_fail_install() {
        let bin = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        fs::write(project.path().join("package.json"), "{}").unwrap();
        // Invalid UTF-8 first, then enough output to fill a pipe buffer.
        let command = fake_installer(
            bin.path(),
            "printf '\\377\\376 progress\\n'\ni=0\nwhile [ $i -lt 4000 ]; do echo \"added package number $i of the dependency tree\"; i=$((i+1)); done\nexit 0",
        );

        let (progress, rx) = Progress::channel();
        let outcome = run_installer(command, project.path(), PackageManager::Npm, &progress)
            .expect("install should succeed");
        drop(progress);
        assert_eq!(outcome.package_manager, PackageManager::Npm);

        let lines: Vec<String> = rx
            .iter()
            .filter_map(|event| match event {
                ProgressEvent::InstallOutput { line, .. } => Some(line),
                _ => None,
            })
            .collect();
        assert_eq!(lines.len(), 4001);
        assert!(lines[0].contains('\u{FFFD}'));
        assert!(lines[0].ends_with(" progress"));
        assert_eq!(lines[4000], "added package number 3999 of the dependency tree");
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_install_keeps_output_tail() {
        let bin = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        fs::write(project.path().join("package.json"), "{}").unwrap();
        let command = fake_installer(
            bin.path(),
            "i=0\nwhile [ $i -lt 100 ]; do echo \"line $i\" >&2; i=$((i+1)); done\necho 'npm ERR! code EACCES' >&2\nexit 1",
        );

        let err = run_installer(command, project.path(), PackageManager::Npm, &Progress::silent())
            .unwrap_err();
        match err {
            SpeckError::DependencyInstall { kind, output, .. } => {
                assert_eq!(kind, InstallFailureKind::PermissionDenied);
                let lines: Vec<&str> = output.lines().collect();
                assert_eq!(lines.len(), OUTPUT_TAIL_LINES);
                assert_eq!(lines.first().copied(), Some("line 61"));
                assert_eq!(lines.last().copied(), Some("npm ERR! code EACCES"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_manifest_is_preflight_failure() {
        let temp = tempfile::tempdir().unwrap();
        let (progress, rx) = Progress::channel();
        let err = install_dependencies(temp.path(), PackageManager::Npm, &progress).unwrap_err();
        drop(progress);

        assert!(matches!(
            err,
            SpeckError::DependencyInstall {
                kind: InstallFailureKind::MissingManifest,
                ..
            }
        ));
        // Nothing was spawned, so nothing was reported.
        assert_eq!(rx.iter().count(), 0);
    }
}
