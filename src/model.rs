use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Points granted for the first correct solution of a challenge
pub const POINTS_PER_SOLVE: i64 = 1;

/// Exit code reported when no process exit status exists
pub const NO_EXIT_CODE: i32 = -1;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Completed,
    CompileError,
    TimedOut,
    InternalError,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::CompileError => "compile_error",
            Self::TimedOut => "timed_out",
            Self::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One single-run request as it travels from the transport to a worker
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub language: String,
    pub source_code: String,
    pub stdin: String,
    pub time_limit: Duration,
}

/// Result of exactly one sandbox invocation
///
/// `stdout` and `stderr` are kept verbatim; any trimming is done by the
/// grading engine on its own copies.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub output_truncated: bool,
}

impl ExecutionResult {
    pub fn completed(stdout: String, stderr: String, exit_code: i32) -> Self {
        Self {
            stdout,
            stderr,
            exit_code,
            outcome: Outcome::Completed,
            output_truncated: false,
        }
    }

    pub fn compile_error(stdout: String, stderr: String, exit_code: i32) -> Self {
        Self {
            stdout,
            stderr,
            exit_code,
            outcome: Outcome::CompileError,
            output_truncated: false,
        }
    }

    pub fn timed_out(stdout: String, message: String) -> Self {
        Self {
            stdout,
            stderr: message,
            exit_code: NO_EXIT_CODE,
            outcome: Outcome::TimedOut,
            output_truncated: false,
        }
    }

    pub fn internal_error(message: String) -> Self {
        Self {
            stdout: String::new(),
            stderr: message,
            exit_code: NO_EXIT_CODE,
            outcome: Outcome::InternalError,
            output_truncated: false,
        }
    }

    pub fn with_truncation(mut self, truncated: bool) -> Self {
        self.output_truncated = truncated;
        self
    }

    pub fn is_completed(&self) -> bool {
        self.outcome == Outcome::Completed
    }
}

/// A hidden input/answer pair owned by challenge data
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    #[serde(default)]
    pub input: String,
    #[serde(rename = "output", alias = "expected_output", default)]
    pub expected_output: String,
}

/// Input and trimmed outputs of one test case, shown only when visible
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CaseDetail {
    pub input: String,
    pub expected_output: String,
    pub actual_output: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TestCaseOutcome {
    pub index: usize,
    pub passed: bool,
    #[serde(flatten)]
    pub detail: Option<CaseDetail>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub all_passed: bool,
    pub outcomes: Vec<TestCaseOutcome>,
}

/// What recording a graded solution did to the requester's score
///
/// `first_correct_solve` is true for exactly one verdict per
/// (user, challenge); only that verdict adds [`POINTS_PER_SOLVE`].
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolveRecord {
    pub first_correct_solve: bool,
    pub points: i64,
}
