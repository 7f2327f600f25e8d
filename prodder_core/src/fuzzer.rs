use crate::corpus::Corpus;
use crate::executor::{ExecutionResult, Executor};
use crate::observer::Observer;
use crate::oracle::Oracle;
use std::time::Instant;
use tracing::{info, warn};

/// Aggregate outcome of one fuzzing run.
#[derive(Debug, Clone)]
pub struct RunVerdict {
    /// One result per executed test case, in corpus order.
    pub results: Vec<ExecutionResult>,
    /// True when any test case crashed, or when the run was cancelled.
    pub any_crash: bool,
    /// The run stopped early because of a cancellation request.
    pub cancelled: bool,
}

impl RunVerdict {
    pub fn from_results(results: Vec<ExecutionResult>, cancelled: bool) -> Self {
        let any_crash = cancelled || results.iter().any(|r| r.crashed);
        Self {
            results,
            any_crash,
            cancelled,
        }
    }

    pub fn crash_count(&self) -> usize {
        self.results.iter().filter(|r| r.crashed).count()
    }

    pub fn crashed_labels(&self) -> impl Iterator<Item = &str> {
        self.results
            .iter()
            .filter(|r| r.crashed)
            .map(|r| r.test_case.label.as_str())
    }

    /// Process exit code for the harness itself: 0 when everything passed.
    pub fn exit_code(&self) -> u8 {
        if self.any_crash { 1 } else { 0 }
    }
}

/// Runs every test case of `corpus` through `executor`, one after another.
///
/// Crashes, timeouts and launch failures are recorded and the loop moves on;
/// only a cancelled execution ends the run before the corpus is exhausted.
pub fn run_corpus<E: Executor + ?Sized>(
    executor: &mut E,
    corpus: &Corpus,
    observers: &mut [&mut dyn Observer],
    oracle: &dyn Oracle,
) -> RunVerdict {
    let start_time = Instant::now();
    let mut results = Vec::with_capacity(corpus.len());
    let mut cancelled = false;

    for test_case in corpus {
        for obs in observers.iter_mut() {
            if let Err(e) = obs.on_test_start(test_case) {
                warn!(observer = obs.name(), error = %e, "Observer on_test_start failed");
            }
        }

        let result = executor.execute(test_case);
        let crash = oracle.examine(&result);

        for obs in observers.iter_mut() {
            if let Err(e) = obs.on_result(&result, crash.as_ref()) {
                warn!(observer = obs.name(), error = %e, "Observer on_result failed");
            }
        }

        cancelled = result.is_cancelled();
        results.push(result);
        if cancelled {
            warn!(label = %test_case.label, "Run cancelled, skipping remaining test cases");
            break;
        }
    }

    let verdict = RunVerdict::from_results(results, cancelled);
    for obs in observers.iter_mut() {
        if let Err(e) = obs.on_finish(&verdict) {
            warn!(observer = obs.name(), error = %e, "Observer on_finish failed");
        }
    }

    info!(
        executed = verdict.results.len(),
        corpus = corpus.len(),
        crashes = verdict.crash_count(),
        cancelled = verdict.cancelled,
        elapsed = ?start_time.elapsed(),
        "Fuzz run finished"
    );
    verdict
}
