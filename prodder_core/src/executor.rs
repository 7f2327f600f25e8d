use crate::cancel::CancellationToken;
use crate::input::TestCase;
use crate::target::LaunchSpec;
use std::io::{self, PipeReader, PipeWriter, Read, Write};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::process::{Child, ChildStdin, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// How often a running target is polled for exit, timeout and cancellation.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long output is still collected once the target is gone.
pub const OUTPUT_DRAIN_WINDOW: Duration = Duration::from_millis(250);

const OUTPUT_CHUNK_SIZE: usize = 64 * 1024;

/// Why an execution ended without a normal exit status being the whole story.
///
/// These never propagate out of the executor: they are stored on the
/// [`ExecutionResult`] of the test case that hit them and the run carries on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// The process could not be started at all.
    #[error("Failed to launch '{program}': {reason}")]
    Launch { program: String, reason: String },
    /// Writing the input, reading the output or waiting on the process failed.
    #[error("I/O error while {stage}: {reason}")]
    Communication { stage: &'static str, reason: String },
    /// The process outlived its time budget and was killed.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    /// The run was cancelled while (or before) this test case ran.
    #[error("Run cancelled")]
    Cancelled,
}

impl ExecutionError {
    fn communication(stage: &'static str, err: impl ToString) -> Self {
        ExecutionError::Communication {
            stage,
            reason: err.to_string(),
        }
    }
}

/// Outcome of running one test case.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub test_case: TestCase,
    pub exit_code: Option<i32>,
    /// Signal that terminated the process, on unix.
    pub signal: Option<i32>,
    /// Interleaved stdout and stderr, in the order the target wrote them.
    pub captured_output: Vec<u8>,
    pub crashed: bool,
    /// Set when the failure happened before or instead of a normal exit.
    pub launch_error: Option<ExecutionError>,
    pub duration: Duration,
}

impl ExecutionResult {
    /// A result for a test case that never produced an exit status.
    pub fn failed(test_case: TestCase, error: ExecutionError, duration: Duration) -> Self {
        Self {
            test_case,
            exit_code: None,
            signal: None,
            captured_output: Vec::new(),
            crashed: true,
            launch_error: Some(error),
            duration,
        }
    }

    pub fn passed(&self) -> bool {
        !self.crashed
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.launch_error, Some(ExecutionError::Timeout(_)))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.launch_error, Some(ExecutionError::Cancelled))
    }

    /// Short human-readable account of how the execution ended.
    pub fn describe(&self) -> String {
        if let Some(err) = &self.launch_error {
            return err.to_string();
        }
        match (self.exit_code, self.signal) {
            (Some(code), _) => format!("Exited with code {code}"),
            (None, Some(signal)) => format!("Terminated by signal {signal}"),
            (None, None) => "Exited abnormally".to_string(),
        }
    }
}

/// Runs a single test case against the target and classifies the outcome.
///
/// Implementations never return errors: every failure mode ends up on the
/// returned [`ExecutionResult`] so the caller can keep going.
pub trait Executor {
    fn execute(&mut self, test_case: &TestCase) -> ExecutionResult;
}

/// Calls a function in the current process instead of spawning a target.
///
/// The function's return value plays the role of the exit code. A panic is
/// a crash with no exit code; its message becomes the captured output.
pub struct InProcessExecutor<F>
where
    F: Fn(&[u8]) -> i32,
{
    harness_fn: F,
}

impl<F> InProcessExecutor<F>
where
    F: Fn(&[u8]) -> i32,
{
    pub fn new(harness_fn: F) -> Self {
        Self { harness_fn }
    }
}

impl<F> Executor for InProcessExecutor<F>
where
    F: Fn(&[u8]) -> i32,
{
    fn execute(&mut self, test_case: &TestCase) -> ExecutionResult {
        let started = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| (self.harness_fn)(&test_case.input)));

        let (exit_code, captured_output) = match outcome {
            Ok(code) => (Some(code), Vec::new()),
            Err(panic_payload) => {
                let msg = if let Some(s) = panic_payload.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_payload.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic type".to_string()
                };
                (None, msg.into_bytes())
            }
        };

        ExecutionResult {
            test_case: test_case.clone(),
            exit_code,
            signal: None,
            captured_output,
            crashed: exit_code != Some(0),
            launch_error: None,
            duration: started.elapsed(),
        }
    }
}

/// Spawns a fresh target process for every test case.
///
/// The input goes to the target's stdin, which is closed afterwards so the
/// target sees end-of-stream. Stdout and stderr share one pipe. Writing and
/// reading happen on helper threads while this one waits on the process,
/// so a target that echoes before it has consumed all of its input cannot
/// deadlock us.
///
/// On unix each target gets its own process group. The group is killed on
/// timeout, on cancellation and once the target has exited, always before
/// the target is reaped. Output still arriving after that (from something
/// that left the group) is collected for [`OUTPUT_DRAIN_WINDOW`] at most.
pub struct CommandExecutor {
    spec: LaunchSpec,
    timeout: Duration,
    poll_interval: Duration,
    cancel: CancellationToken,
}

impl CommandExecutor {
    pub fn new(spec: LaunchSpec, timeout: Duration) -> Self {
        Self {
            spec,
            timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn spawn(&self, output: PipeWriter) -> io::Result<Child> {
        let mut cmd = self.spec.command();
        cmd.stdin(Stdio::piped())
            .stdout(output.try_clone()?)
            .stderr(output);
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        // `cmd` still owns our copies of the pipe's write end; dropping it on
        // return leaves the target as the only writer.
        cmd.spawn()
    }

    fn wait_with_timeout(&self, child: &mut Child) -> Result<ExitStatus, ExecutionError> {
        let start_time = Instant::now();

        loop {
            match poll_exit(child) {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => {
                    if self.cancel.is_cancelled() {
                        warn!(pid = child.id(), "Run cancelled, killing target");
                        terminate(child);
                        return Err(ExecutionError::Cancelled);
                    }
                    if start_time.elapsed() > self.timeout {
                        warn!(
                            pid = child.id(),
                            timeout = ?self.timeout,
                            "Target timed out, killing"
                        );
                        terminate(child);
                        return Err(ExecutionError::Timeout(self.timeout));
                    }
                    thread::sleep(self.poll_interval);
                }
                Err(e) => {
                    warn!(error = %e, "Error waiting for target");
                    terminate(child);
                    return Err(ExecutionError::communication("waiting for process", e));
                }
            }
        }
    }
}

impl Executor for CommandExecutor {
    fn execute(&mut self, test_case: &TestCase) -> ExecutionResult {
        let started = Instant::now();
        if self.cancel.is_cancelled() {
            return ExecutionResult::failed(
                test_case.clone(),
                ExecutionError::Cancelled,
                started.elapsed(),
            );
        }

        let (output_reader, output_writer) = match io::pipe() {
            Ok(ends) => ends,
            Err(e) => {
                return ExecutionResult::failed(
                    test_case.clone(),
                    ExecutionError::communication("creating output pipe", e),
                    started.elapsed(),
                );
            }
        };

        let mut child = match self.spawn(output_writer) {
            Ok(child) => child,
            Err(e) => {
                warn!(target_cmd = %self.spec, error = %e, "Failed to spawn target");
                return ExecutionResult::failed(
                    test_case.clone(),
                    ExecutionError::Launch {
                        program: self.spec.to_string(),
                        reason: e.to_string(),
                    },
                    started.elapsed(),
                );
            }
        };
        debug!(
            label = %test_case.label,
            pid = child.id(),
            bytes = test_case.len(),
            "Spawned target"
        );

        let (written_tx, written_rx) = mpsc::channel();
        let (chunks_tx, chunks_rx) = mpsc::channel();
        let stdin = child.stdin.take();
        let input = test_case.input.clone();
        let helpers = spawn_helper("prodder-stdin", move || {
            // The receiver may already be gone if the target outlived its window.
            let _ = written_tx.send(write_input(stdin, &input));
        })
        .and_then(|()| {
            spawn_helper("prodder-output", move || pump_output(output_reader, chunks_tx))
        });
        if let Err(e) = helpers {
            terminate(&mut child);
            return ExecutionResult::failed(test_case.clone(), e, started.elapsed());
        }

        let wait_result = self.wait_with_timeout(&mut child);

        // Both helpers are detached: whatever is still holding the target's
        // pipes open no longer holds up the run.
        let drain_deadline = Instant::now() + OUTPUT_DRAIN_WINDOW;
        let read_result = collect_output(&chunks_rx, drain_deadline);
        let write_result = match written_rx.recv_timeout(remaining(drain_deadline)) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                debug!(label = %test_case.label, "Input still unread after target exit");
                Ok(())
            }
            Err(RecvTimeoutError::Disconnected) => Err(ExecutionError::communication(
                "writing input",
                "helper thread panicked",
            )),
        };

        let mut result = ExecutionResult {
            test_case: test_case.clone(),
            exit_code: None,
            signal: None,
            captured_output: Vec::new(),
            crashed: true,
            launch_error: None,
            duration: started.elapsed(),
        };

        let mut io_error = write_result.err();
        match read_result {
            Ok(captured) => result.captured_output = captured,
            Err(e) => {
                io_error.get_or_insert(e);
            }
        }

        match wait_result {
            Ok(status) => {
                result.exit_code = status.code();
                result.signal = exit_signal(&status);
                result.crashed = !status.success() || io_error.is_some();
                result.launch_error = io_error;
            }
            Err(e) => result.launch_error = Some(e),
        }

        debug!(
            label = %test_case.label,
            crashed = result.crashed,
            elapsed = ?result.duration,
            "Target finished"
        );
        result
    }
}

fn spawn_helper<F>(name: &str, body: F) -> Result<(), ExecutionError>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .map(|_| ())
        .map_err(|e| ExecutionError::communication("starting helper thread", e))
}

/// Writes the whole input and closes stdin.
///
/// A target is free to stop reading early, so a broken pipe is not an error.
fn write_input(stdin: Option<ChildStdin>, input: &[u8]) -> Result<(), ExecutionError> {
    let Some(mut stdin) = stdin else {
        return Err(ExecutionError::communication(
            "writing input",
            "stdin was not captured",
        ));
    };

    match stdin.write_all(input).and_then(|()| stdin.flush()) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
            debug!("Target closed stdin before reading all input");
            Ok(())
        }
        Err(e) => Err(ExecutionError::communication("writing input", e)),
    }
}

/// Forwards output chunks until end-of-stream or until nobody listens.
fn pump_output(mut reader: PipeReader, chunks: Sender<io::Result<Vec<u8>>>) {
    let mut buf = vec![0u8; OUTPUT_CHUNK_SIZE];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => return,
            Ok(n) => {
                if chunks.send(Ok(buf[..n].to_vec())).is_err() {
                    return;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                let _ = chunks.send(Err(e));
                return;
            }
        }
    }
}

/// Gathers output until the pipe closes or `deadline` passes.
///
/// Hitting the deadline is not a failure; what arrived so far is kept.
fn collect_output(
    chunks: &Receiver<io::Result<Vec<u8>>>,
    deadline: Instant,
) -> Result<Vec<u8>, ExecutionError> {
    let mut captured = Vec::new();
    loop {
        match chunks.recv_timeout(remaining(deadline)) {
            Ok(Ok(chunk)) => captured.extend_from_slice(&chunk),
            Ok(Err(e)) => return Err(ExecutionError::communication("reading output", e)),
            Err(RecvTimeoutError::Disconnected) => return Ok(captured),
            Err(RecvTimeoutError::Timeout) => {
                debug!(
                    bytes = captured.len(),
                    "Output pipe still open after target exit, giving up on it"
                );
                return Ok(captured);
            }
        }
    }
}

fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

/// Reaps the target if it has exited, killing its process group first.
#[cfg(unix)]
fn poll_exit(child: &mut Child) -> io::Result<Option<ExitStatus>> {
    if !leader_has_exited(child)? {
        return Ok(None);
    }
    kill_process_group(child);
    child.wait().map(Some)
}

#[cfg(not(unix))]
fn poll_exit(child: &mut Child) -> io::Result<Option<ExitStatus>> {
    child.try_wait()
}

/// Checks for exit without reaping, so the pid (and with it the group id)
/// cannot be handed to another process yet.
#[cfg(unix)]
fn leader_has_exited(child: &Child) -> io::Result<bool> {
    let pid = libc::id_t::from(child.id());
    // SAFETY: all-zero is a valid siginfo_t, and waitid only writes into it.
    let mut info: libc::siginfo_t = unsafe { std::mem::zeroed() };
    let rc = unsafe {
        libc::waitid(
            libc::P_PID,
            pid,
            &mut info,
            libc::WEXITED | libc::WNOHANG | libc::WNOWAIT,
        )
    };
    if rc == -1 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(false);
        }
        return Err(err);
    }
    // With WNOHANG and nothing to report, si_pid is left at zero.
    // SAFETY: waitid filled in a child-state siginfo_t.
    Ok(unsafe { info.si_pid() } != 0)
}

/// Kills the target (and its process group) and reaps it.
///
/// Only called while the target is unreaped.
fn terminate(child: &mut Child) {
    kill_process_group(child);
    if let Err(e) = child.kill() {
        // InvalidInput means it already exited, which is what we want.
        if e.kind() != io::ErrorKind::InvalidInput {
            warn!(pid = child.id(), error = %e, "Failed to kill target");
        }
    }
    if let Err(e) = child.wait() {
        warn!(pid = child.id(), error = %e, "Failed to reap target");
    }
}

#[cfg(unix)]
fn kill_process_group(child: &Child) {
    let Ok(pgid) = libc::pid_t::try_from(child.id()) else {
        return;
    };
    // The target leads its own group (see `CommandExecutor::spawn`) and is
    // not reaped yet; ESRCH just means nothing in it is left.
    unsafe {
        libc::kill(-pgid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_child: &Child) {}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

#[cfg(test)]
mod in_process_executor_tests {
    use super::*;

    fn ok_harness(_data: &[u8]) -> i32 {
        0
    }

    fn picky_harness(data: &[u8]) -> i32 {
        if data.first() == Some(&0xFF) {
            panic!("Boom!");
        }
        if data.is_empty() { 3 } else { 0 }
    }

    #[test]
    fn zero_return_is_a_pass() {
        let mut executor = InProcessExecutor::new(ok_harness);
        let result = executor.execute(&TestCase::seed(b"hello"));
        assert!(result.passed());
        assert_eq!(result.exit_code, Some(0));
        assert!(result.launch_error.is_none());
        assert_eq!(result.describe(), "Exited with code 0");
    }

    #[test]
    fn non_zero_return_is_a_crash() {
        let mut executor = InProcessExecutor::new(picky_harness);
        let result = executor.execute(&TestCase::new("empty-input", ""));
        assert!(result.crashed);
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.test_case.label, "empty-input");
    }

    #[test]
    fn panic_is_a_crash_with_message_captured() {
        let mut executor = InProcessExecutor::new(picky_harness);
        let result = executor.execute(&TestCase::new("random-byte-0", vec![0xFF]));
        assert!(result.crashed);
        assert_eq!(result.exit_code, None);
        assert!(String::from_utf8_lossy(&result.captured_output).contains("Boom!"));
        assert_eq!(result.describe(), "Exited abnormally");
    }

    #[test]
    fn describe_prefers_the_error() {
        let result = ExecutionResult::failed(
            TestCase::seed(b""),
            ExecutionError::Timeout(Duration::from_millis(250)),
            Duration::ZERO,
        );
        assert!(result.is_timeout());
        assert!(!result.is_cancelled());
        assert_eq!(result.describe(), "Timed out after 250ms");
    }
}
