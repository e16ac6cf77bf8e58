use std::sync::Arc;
use std::time::Duration;

use crate::error::JudgeError;
use crate::model::{CaseDetail, TestCase, TestCaseOutcome, Verdict};
use crate::sandbox::SandboxRunner;
use crate::toolchain::ToolchainRegistry;

/// One grading job as queued by the transport
#[derive(Debug, Clone)]
pub struct GradeRequest {
    pub language: String,
    pub source_code: String,
    pub test_cases: Vec<TestCase>,
    pub privileged: bool,
}

/// Runs a submission against a challenge's test cases and builds the verdict
pub struct GradingEngine {
    registry: Arc<ToolchainRegistry>,
    runner: Arc<dyn SandboxRunner>,
    /// Wall-clock budget of every test case
    time_limit: Duration,
}

impl GradingEngine {
    pub fn new(
        registry: Arc<ToolchainRegistry>,
        runner: Arc<dyn SandboxRunner>,
        time_limit: Duration,
    ) -> Self {
        Self {
            registry,
            runner,
            time_limit,
        }
    }

    /// Grades `source_code` against `test_cases` in order
    ///
    /// The first test case whose execution does not complete aborts the
    /// whole run with [`JudgeError::Execution`]; the remaining cases are not
    /// executed. Blocking, like [`SandboxRunner::run`].
    pub fn grade(
        &self,
        toolchain_id: &str,
        source_code: &str,
        test_cases: &[TestCase],
        privileged: bool,
    ) -> Result<Verdict, JudgeError> {
        if test_cases.is_empty() {
            return Err(JudgeError::NoTestCases);
        }
        let toolchain = self.registry.lookup(toolchain_id)?;

        let mut outcomes = Vec::with_capacity(test_cases.len());
        for (index, case) in test_cases.iter().enumerate() {
            let result = self
                .runner
                .run(&toolchain, source_code, &case.input, self.time_limit);

            if !result.is_completed() {
                log::info!(
                    "Grading aborted at test case {index} with outcome {}",
                    result.outcome
                );
                return Err(JudgeError::Execution { index, result });
            }

            let comparison = Comparison::new(&result.stdout, &case.expected_output);
            let passed = comparison.is_match() && result.exit_code == 0;
            let detail = reveals_detail(index, privileged).then(|| comparison.detail(&case.input));

            outcomes.push(TestCaseOutcome {
                index,
                passed,
                detail,
            });
        }

        let all_passed = outcomes.iter().all(|o| o.passed);
        log::debug!(
            "Graded {} test cases, all passed: {all_passed}",
            outcomes.len()
        );
        Ok(Verdict {
            all_passed,
            outcomes,
        })
    }
}

/// Visibility policy: the first case is always shown in full, the rest only
/// to privileged requesters
pub fn reveals_detail(index: usize, privileged: bool) -> bool {
    index == 0 || privileged
}

/// Trimmed views of a program's output and the expected answer
///
/// The raw `ExecutionResult` stays untouched; only these views are trimmed.
struct Comparison<'a> {
    actual: &'a str,
    expected: &'a str,
}

impl<'a> Comparison<'a> {
    fn new(raw_actual: &'a str, raw_expected: &'a str) -> Self {
        Self {
            actual: raw_actual.trim(),
            expected: raw_expected.trim(),
        }
    }

    fn is_match(&self) -> bool {
        self.actual == self.expected
    }

    fn detail(&self, input: &str) -> CaseDetail {
        CaseDetail {
            input: input.to_string(),
            expected_output: self.expected.to_string(),
            actual_output: self.actual.to_string(),
        }
    }
}
