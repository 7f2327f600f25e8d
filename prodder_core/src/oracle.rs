use crate::executor::{ExecutionError, ExecutionResult};
use serde::Serialize;
use std::fmt;

/// Broad category of a detected crash, used to group findings in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CrashKind {
    /// Exited with a non-zero code.
    ExitCode,
    /// Killed by a signal, or ended without an exit code.
    AbnormalExit,
    Timeout,
    LaunchFailure,
    CommunicationFailure,
}

impl fmt::Display for CrashKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CrashKind::ExitCode => "exit-code",
            CrashKind::AbnormalExit => "abnormal-exit",
            CrashKind::Timeout => "timeout",
            CrashKind::LaunchFailure => "launch-failure",
            CrashKind::CommunicationFailure => "communication-failure",
        };
        f.write_str(s)
    }
}

/// A finding attributed to one test case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashReport {
    /// Label of the test case (the mutator that produced it, or `seed`).
    pub label: String,
    pub kind: CrashKind,
    /// A human-readable description of what went wrong.
    pub description: String,
    /// MD5 hex digest of the input, for deduplication and grepping.
    pub input_hash: String,
}

/// An `Oracle` looks at the outcome of one execution and decides whether it
/// is a bug worth reporting.
pub trait Oracle {
    fn examine(&self, result: &ExecutionResult) -> Option<CrashReport>;
}

/// Reports every execution the executor flagged as crashed.
///
/// Cancelled executions are skipped: the target didn't misbehave, the run
/// was stopped under it.
#[derive(Debug, Default)]
pub struct CrashOracle;

impl CrashOracle {
    pub fn new() -> Self {
        CrashOracle
    }
}

impl Oracle for CrashOracle {
    fn examine(&self, result: &ExecutionResult) -> Option<CrashReport> {
        if !result.crashed {
            return None;
        }

        let kind = match &result.launch_error {
            Some(ExecutionError::Cancelled) => return None,
            Some(ExecutionError::Launch { .. }) => CrashKind::LaunchFailure,
            Some(ExecutionError::Communication { .. }) => CrashKind::CommunicationFailure,
            Some(ExecutionError::Timeout(_)) => CrashKind::Timeout,
            None if result.exit_code.is_some() => CrashKind::ExitCode,
            None => CrashKind::AbnormalExit,
        };

        Some(CrashReport {
            label: result.test_case.label.clone(),
            kind,
            description: result.describe(),
            input_hash: result.test_case.input_md5(),
        })
    }
}
