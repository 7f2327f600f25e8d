use crate::executor::ExecutionResult;
use crate::fuzzer::RunVerdict;
use crate::input::TestCase;
use crate::oracle::CrashReport;
use std::io::Write;

/// How much of an input the console report shows before cutting it short.
pub const DEFAULT_PREVIEW_BYTES: usize = 256;

/// An `Observer` is notified by the fuzz driver as the run progresses.
///
/// Observers are invoked before each test case runs (`on_test_start`), after
/// it finishes (`on_result`) and once at the end of the run (`on_finish`).
/// They are how reports get produced; they have no say in how test cases are
/// executed or classified.
///
/// An observer returning an error never stops the run: the driver logs the
/// failure and moves on to the next test case.
pub trait Observer {
    /// Returns a static string name identifying the observer, used in logs.
    fn name(&self) -> &'static str;

    /// Called right before `test_case` is handed to the executor.
    fn on_test_start(&mut self, test_case: &TestCase) -> Result<(), anyhow::Error>;

    /// Called with the result of every test case, in corpus order.
    ///
    /// # Arguments
    /// * `result`: What the executor observed.
    /// * `crash`: The oracle's report, when it considered the result a crash.
    fn on_result(
        &mut self,
        result: &ExecutionResult,
        crash: Option<&CrashReport>,
    ) -> Result<(), anyhow::Error>;

    /// Called once after the last test case.
    fn on_finish(&mut self, _verdict: &RunVerdict) -> Result<(), anyhow::Error> {
        Ok(())
    }
}

/// Writes the human-readable report.
///
/// Per-test-case details go to `out`. Every crash also gets a single
/// `Crash detected` line on `err`, whatever `show_cases` says, so failures
/// can be grepped out of a run.
pub struct ConsoleObserver<O: Write, E: Write> {
    out: O,
    err: E,
    show_cases: bool,
    preview_bytes: usize,
}

impl<O: Write, E: Write> ConsoleObserver<O, E> {
    pub fn new(out: O, err: E) -> Self {
        Self {
            out,
            err,
            show_cases: true,
            preview_bytes: DEFAULT_PREVIEW_BYTES,
        }
    }

    /// Only emit the crash lines, e.g. when another format owns `out`.
    pub fn crashes_only(mut self) -> Self {
        self.show_cases = false;
        self
    }

    pub fn with_preview_bytes(mut self, preview_bytes: usize) -> Self {
        self.preview_bytes = preview_bytes;
        self
    }

    pub fn into_inner(self) -> (O, E) {
        (self.out, self.err)
    }
}

impl<O: Write, E: Write> Observer for ConsoleObserver<O, E> {
    fn name(&self) -> &'static str {
        "ConsoleObserver"
    }

    fn on_test_start(&mut self, test_case: &TestCase) -> Result<(), anyhow::Error> {
        if self.show_cases {
            writeln!(
                self.out,
                "Testing input [{}]: {}",
                test_case.label,
                test_case.preview(self.preview_bytes)
            )?;
        }
        Ok(())
    }

    fn on_result(
        &mut self,
        result: &ExecutionResult,
        crash: Option<&CrashReport>,
    ) -> Result<(), anyhow::Error> {
        if self.show_cases {
            match (&result.launch_error, result.exit_code) {
                (None, Some(code)) => writeln!(self.out, "Exit code: {code}")?,
                _ => writeln!(self.out, "Failure: {}", result.describe())?,
            }
            writeln!(self.out, "Output:")?;
            if result.captured_output.is_empty() {
                writeln!(self.out, "(no output)")?;
            } else {
                self.out.write_all(&result.captured_output)?;
                if !result.captured_output.ends_with(b"\n") {
                    writeln!(self.out)?;
                }
            }
            writeln!(self.out)?;
        }

        if let Some(report) = crash {
            writeln!(
                self.err,
                "Crash detected [{}] ({}, md5 {}): {}",
                report.label, report.kind, report.input_hash, report.description
            )?;
        }
        Ok(())
    }

    fn on_finish(&mut self, verdict: &RunVerdict) -> Result<(), anyhow::Error> {
        if self.show_cases {
            writeln!(
                self.out,
                "{} test case(s) run, {} crashed{}",
                verdict.results.len(),
                verdict.crash_count(),
                if verdict.cancelled { " (run cancelled)" } else { "" }
            )?;
        }
        self.out.flush()?;
        self.err.flush()?;
        Ok(())
    }
}
