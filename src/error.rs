use thiserror::Error;

use crate::model::ExecutionResult;

/// Failures surfaced by the judging core
///
/// Launch and I/O faults inside the sandbox never show up here; they are
/// folded into an [`ExecutionResult`] with an `InternalError` outcome.
#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("no test cases available")]
    NoTestCases,

    /// Grading stopped at the first test case that did not complete
    #[error("test case {index} aborted grading: {}", result.outcome)]
    Execution {
        index: usize,
        result: ExecutionResult,
    },
}
