use crate::config::FuzzConfig;
use crate::executor::ExecutionResult;
use crate::fuzzer::RunVerdict;
use crate::observer::DEFAULT_PREVIEW_BYTES;
use crate::oracle::{CrashKind, CrashOracle, Oracle};
use serde::Serialize;

/// Machine-readable summary of a run, emitted as one JSON document.
#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct JsonReport {
    pub command: String,
    pub config: FuzzConfig,
    pub any_crash: bool,
    pub cancelled: bool,
    pub crash_count: usize,
    pub results: Vec<JsonResult>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct JsonResult {
    pub label: String,
    pub input_preview: String,
    pub input_len: usize,
    pub input_md5: String,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub crashed: bool,
    pub crash_kind: Option<CrashKind>,
    pub error: Option<String>,
    pub duration_ms: u64,
    /// Captured stdout and stderr, decoded as lossy UTF-8.
    pub output: String,
}

impl JsonResult {
    fn from_result(result: &ExecutionResult, oracle: &dyn Oracle) -> Self {
        let tc = &result.test_case;
        Self {
            label: tc.label.clone(),
            input_preview: tc.preview(DEFAULT_PREVIEW_BYTES),
            input_len: tc.len(),
            input_md5: tc.input_md5(),
            exit_code: result.exit_code,
            signal: result.signal,
            crashed: result.crashed,
            crash_kind: oracle.examine(result).map(|report| report.kind),
            error: result.launch_error.as_ref().map(ToString::to_string),
            duration_ms: u64::try_from(result.duration.as_millis()).unwrap_or(u64::MAX),
            output: String::from_utf8_lossy(&result.captured_output).into_owned(),
        }
    }
}

impl JsonReport {
    pub fn from_verdict(command: &str, config: &FuzzConfig, verdict: &RunVerdict) -> Self {
        let oracle = CrashOracle::new();
        Self {
            command: command.to_string(),
            config: config.clone(),
            any_crash: verdict.any_crash,
            cancelled: verdict.cancelled,
            crash_count: verdict.crash_count(),
            results: verdict
                .results
                .iter()
                .map(|r| JsonResult::from_result(r, &oracle))
                .collect(),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutionError;
    use crate::input::TestCase;
    use serde_json::Value;
    use std::time::Duration;

    fn verdict() -> RunVerdict {
        let pass = ExecutionResult {
            test_case: TestCase::seed(b"<a>"),
            exit_code: Some(0),
            signal: None,
            captured_output: b"<a>\n".to_vec(),
            crashed: false,
            launch_error: None,
            duration: Duration::from_millis(3),
        };
        let hang = ExecutionResult::failed(
            TestCase::new("oversized-input", "<html>".repeat(3)),
            ExecutionError::Timeout(Duration::from_secs(2)),
            Duration::from_secs(2),
        );
        RunVerdict::from_results(vec![pass, hang], false)
    }

    #[test]
    fn json_report_has_one_entry_per_result() {
        let report = JsonReport::from_verdict("./parser", &FuzzConfig::default(), &verdict());
        let json: Value = serde_json::from_str(&report.to_json_pretty().unwrap()).unwrap();

        assert_eq!(json["command"], "./parser");
        assert_eq!(json["any-crash"], true);
        assert_eq!(json["cancelled"], false);
        assert_eq!(json["crash-count"], 1);
        assert_eq!(json["config"]["timeout-ms"], 2000);

        let results = json["results"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["label"], "seed");
        assert_eq!(results[0]["exit-code"], 0);
        assert_eq!(results[0]["crash-kind"], Value::Null);
        assert_eq!(results[0]["output"], "<a>\n");
        assert_eq!(results[0]["duration-ms"], 3);

        assert_eq!(results[1]["label"], "oversized-input");
        assert_eq!(results[1]["crashed"], true);
        assert_eq!(results[1]["crash-kind"], "timeout");
        assert_eq!(results[1]["error"], "Timed out after 2s");
        assert_eq!(results[1]["exit-code"], Value::Null);
        assert_eq!(results[1]["input-len"], 18);
    }

    #[test]
    fn input_md5_matches_test_case() {
        let v = verdict();
        let report = JsonReport::from_verdict("cat", &FuzzConfig::default(), &v);
        assert_eq!(report.results[0].input_md5, v.results[0].test_case.input_md5());
    }
}
