use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

/// Problems with the target command that stop a run before anything executes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TargetError {
    /// The command line was empty or only whitespace.
    #[error("No command given to fuzz")]
    EmptyCommand,
    /// The program named by the command does not exist.
    #[error("Could not find command '{command}' (working directory {working_dir:?})")]
    NotFound {
        command: String,
        working_dir: PathBuf,
    },
}

/// How to start the target process. Built once per run and never modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

impl LaunchSpec {
    pub fn new(
        program: impl Into<PathBuf>,
        args: Vec<String>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: working_dir.into(),
        }
    }

    /// Runs `command` through the platform shell: `cmd /c` on Windows,
    /// `sh -c` everywhere else.
    pub fn shell(command: &str, working_dir: impl Into<PathBuf>) -> Self {
        let (shell, flag) = if cfg!(windows) {
            ("cmd", "/c")
        } else {
            ("sh", "-c")
        };
        Self::new(
            shell,
            vec![flag.to_string(), command.to_string()],
            working_dir,
        )
    }

    /// A fresh `Command` for this spec, with no stdio configured yet.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).current_dir(&self.working_dir);
        cmd
    }
}

impl fmt::Display for LaunchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " {arg:?}")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Checks that `command` names something runnable and builds its shell
/// launch spec.
///
/// The program is the first whitespace-separated word. A program containing
/// a path separator must exist relative to `working_dir`. A bare name may
/// live in `working_dir` or in any `PATH` entry.
pub fn resolve_target(command: &str, working_dir: &Path) -> Result<LaunchSpec, TargetError> {
    let program = command
        .split_whitespace()
        .next()
        .ok_or(TargetError::EmptyCommand)?;

    if !program_exists(program, working_dir) {
        return Err(TargetError::NotFound {
            command: command.to_string(),
            working_dir: working_dir.to_path_buf(),
        });
    }

    Ok(LaunchSpec::shell(command, working_dir))
}

fn program_exists(program: &str, working_dir: &Path) -> bool {
    if working_dir.join(program).exists() {
        return true;
    }
    if program.contains(std::path::is_separator) {
        return false;
    }

    env::var_os("PATH")
        .map(|paths| env::split_paths(&paths).any(|dir| found_in(&dir, program)))
        .unwrap_or(false)
}

fn found_in(dir: &Path, program: &str) -> bool {
    let candidate = dir.join(program);
    if candidate.is_file() {
        return true;
    }
    cfg!(windows)
        && ["exe", "bat", "cmd", "com"]
            .iter()
            .any(|ext| candidate.with_extension(ext).is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn shell_spec_wraps_command() {
        let spec = LaunchSpec::shell("cat -n", "/tmp");
        if cfg!(windows) {
            assert_eq!(spec.program, PathBuf::from("cmd"));
            assert_eq!(spec.args, ["/c", "cat -n"]);
        } else {
            assert_eq!(spec.program, PathBuf::from("sh"));
            assert_eq!(spec.args, ["-c", "cat -n"]);
            assert_eq!(spec.to_string(), r#"sh -c "cat -n""#);
        }
        assert_eq!(spec.working_dir, PathBuf::from("/tmp"));
    }

    #[test]
    fn empty_command_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            resolve_target("   ", dir.path()),
            Err(TargetError::EmptyCommand)
        );
    }

    #[test]
    fn missing_relative_program_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_target("./no_such_target.sh --flag", dir.path()).unwrap_err();
        match err {
            TargetError::NotFound {
                command,
                working_dir,
            } => {
                assert_eq!(command, "./no_such_target.sh --flag");
                assert_eq!(working_dir, dir.path());
            }
            other => panic!("Expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn missing_bare_program_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            resolve_target("prodder-surely-not-installed-12345", dir.path()),
            Err(TargetError::NotFound { .. })
        ));
    }

    #[test]
    fn program_relative_to_working_dir_is_found() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("target.sh"), "exit 0\n").unwrap();

        let spec = resolve_target("./target.sh", dir.path()).unwrap();
        assert_eq!(spec, LaunchSpec::shell("./target.sh", dir.path()));
        assert!(resolve_target("target.sh", dir.path()).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn program_on_path_is_found() {
        let dir = tempfile::tempdir().unwrap();
        let spec = resolve_target("sh -c 'exit 0'", dir.path()).unwrap();
        assert_eq!(spec.args[1], "sh -c 'exit 0'");
    }
}
