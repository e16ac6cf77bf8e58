use actix_web::http::StatusCode;
use actix_web::{HttpResponse, Responder, get, post, web};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use tokio::sync::oneshot;

use super::compile::default_language;
use super::{
    ErrorResponseWithMessage, Requester, database_error_response, queue_full_response,
    worker_lost_response,
};
use crate::config::{ChallengeConfig, Difficulty};
use crate::database::{self as db, SolutionRecord};
use crate::error::JudgeError;
use crate::grading::GradeRequest;
use crate::model::{ExecutionResult, Outcome, TestCase, TestCaseOutcome, Verdict};
use crate::queue::{JobMessage, JobQueue};
use crate::toolchain::ToolchainRegistry;

/// Public rendering of a challenge
///
/// Test cases are only included for privileged callers and the author.
#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct ChallengeView<'a> {
    pub id: u32,
    pub title: &'a str,
    pub description: &'a str,
    pub difficulty: Difficulty,
    pub example_input: &'a str,
    pub example_output: &'a str,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_cases: Option<&'a [TestCase]>,
}

impl<'a> ChallengeView<'a> {
    pub fn new(challenge: &'a ChallengeConfig, requester: &Requester) -> Self {
        let is_author = challenge.created_by.as_deref() == Some(requester.user_id.as_str());
        Self {
            id: challenge.id,
            title: &challenge.title,
            description: &challenge.description,
            difficulty: challenge.difficulty,
            example_input: &challenge.example_input,
            example_output: &challenge.example_output,
            active: challenge.active,
            test_cases: (requester.privileged || is_author).then_some(challenge.test_cases.as_slice()),
        }
    }
}

fn visible_to<'a>(
    challenges: &'a [ChallengeConfig],
    id: u32,
    requester: &Requester,
) -> Option<&'a ChallengeConfig> {
    challenges
        .iter()
        .find(|c| c.id == id)
        .filter(|c| c.active || requester.privileged)
}

fn challenge_not_found() -> HttpResponse {
    HttpResponse::NotFound().json(ErrorResponseWithMessage {
        reason: "ERR_NOT_FOUND",
        code: 3,
        message: "Challenge not found.".to_string(),
    })
}

#[get("/challenges")]
pub async fn get_challenges_handler(
    requester: Requester,
    challenges: web::Data<Vec<ChallengeConfig>>,
) -> impl Responder {
    let views: Vec<ChallengeView> = challenges
        .iter()
        .filter(|c| c.active || requester.privileged)
        .map(|c| ChallengeView::new(c, &requester))
        .collect();
    HttpResponse::Ok().json(views)
}

#[get("/challenges/{id}")]
pub async fn get_challenge_handler(
    requester: Requester,
    challenges: web::Data<Vec<ChallengeConfig>>,
    path: web::Path<u32>,
) -> impl Responder {
    match visible_to(&challenges, path.into_inner(), &requester) {
        Some(challenge) => HttpResponse::Ok().json(ChallengeView::new(challenge, &requester)),
        None => challenge_not_found(),
    }
}

#[derive(Deserialize, Debug)]
pub struct SolveRequest {
    #[serde(default)]
    pub code: String,
    #[serde(default = "default_language")]
    pub language: String,
}

#[derive(Serialize)]
struct SolveResponse {
    solution: SolutionRecord,
    all_tests_passed: bool,
    test_results: Vec<TestCaseOutcome>,
    first_correct_solve: bool,
    points: i64,
}

#[derive(Serialize)]
struct GradingErrorResponse {
    reason: &'static str,
    code: u32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    test_case: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<ExecutionResult>,
}

fn grading_error_response(err: JudgeError) -> HttpResponse {
    let message = err.to_string();
    let (status, reason, code, test_case, result) = match err {
        JudgeError::UnsupportedLanguage(_) | JudgeError::NoTestCases => {
            (StatusCode::BAD_REQUEST, "ERR_INVALID_ARGUMENT", 1, None, None)
        }
        JudgeError::Execution { index, result } => {
            let (status, reason, code) = match result.outcome {
                Outcome::CompileError => (StatusCode::BAD_REQUEST, "ERR_COMPILATION", 8),
                Outcome::TimedOut => (StatusCode::REQUEST_TIMEOUT, "ERR_TIMEOUT", 7),
                Outcome::Completed | Outcome::InternalError => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "ERR_INTERNAL", 6)
                }
            };
            (status, reason, code, Some(index), Some(result))
        }
    };

    HttpResponse::build(status).json(GradingErrorResponse {
        reason,
        code,
        message,
        test_case,
        result,
    })
}

#[post("/challenges/{id}/solve")]
pub async fn post_solve_handler(
    requester: Requester,
    challenges: web::Data<Vec<ChallengeConfig>>,
    registry: web::Data<ToolchainRegistry>,
    job_queue: web::Data<JobQueue>,
    pool: web::Data<SqlitePool>,
    path: web::Path<u32>,
    body: web::Json<SolveRequest>,
) -> impl Responder {
    let Some(challenge) = visible_to(&challenges, path.into_inner(), &requester) else {
        return challenge_not_found();
    };
    let body = body.into_inner();

    if challenge.test_cases.is_empty() {
        log::warn!("Challenge {} has no test cases to grade against", challenge.id);
        return grading_error_response(JudgeError::NoTestCases);
    }
    let toolchain = match registry.lookup(&body.language) {
        Ok(toolchain) => toolchain,
        Err(e) => return grading_error_response(e),
    };

    let (tx, rx) = oneshot::channel::<Result<Verdict, JudgeError>>();
    let job_message = JobMessage::Grade {
        request: GradeRequest {
            language: toolchain.name.clone(),
            source_code: body.code.clone(),
            test_cases: challenge.test_cases.clone(),
            privileged: requester.privileged,
        },
        responder: tx,
    };

    if job_queue.try_push(job_message).await.is_err() {
        return queue_full_response();
    }
    log::debug!(
        "Sent grade job for challenge {} of {} to queue",
        challenge.id,
        requester.user_id
    );

    let verdict = match rx.await {
        Ok(Ok(verdict)) => verdict,
        Ok(Err(e)) => {
            log::info!(
                "Grading of challenge {} for {} failed: {e}",
                challenge.id,
                requester.user_id
            );
            return grading_error_response(e);
        }
        Err(e) => {
            log::error!("Failed to receive grading result: {e}");
            return worker_lost_response();
        }
    };

    match db::record_solution(
        pool.get_ref(),
        &requester.user_id,
        challenge.id,
        &body.code,
        &toolchain.name,
        verdict.all_passed,
    )
    .await
    {
        Ok((solution, record)) => HttpResponse::Ok().json(SolveResponse {
            solution,
            all_tests_passed: verdict.all_passed,
            test_results: verdict.outcomes,
            first_correct_solve: record.first_correct_solve,
            points: record.points,
        }),
        Err(e) => {
            log::error!("Failed to record solution: {e}");
            database_error_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn challenge(created_by: Option<&str>) -> ChallengeConfig {
        ChallengeConfig {
            id: 7,
            title: "Echo".to_string(),
            description: "Print the input".to_string(),
            difficulty: Difficulty::Easy,
            example_input: "hi".to_string(),
            example_output: "hi".to_string(),
            created_by: created_by.map(str::to_string),
            active: true,
            test_cases: vec![TestCase {
                input: "a".to_string(),
                expected_output: "a".to_string(),
            }],
        }
    }

    fn requester(user_id: &str, privileged: bool) -> Requester {
        Requester {
            user_id: user_id.to_string(),
            privileged,
        }
    }

    #[test]
    fn test_view_hides_test_cases_from_regular_users() {
        let challenge = challenge(Some("carol"));
        assert!(
            ChallengeView::new(&challenge, &requester("dave", false))
                .test_cases
                .is_none()
        );
        assert!(
            ChallengeView::new(&challenge, &requester("carol", false))
                .test_cases
                .is_some()
        );
        assert!(
            ChallengeView::new(&challenge, &requester("erin", true))
                .test_cases
                .is_some()
        );
    }

    #[test]
    fn test_inactive_challenge_visible_only_to_privileged() {
        let mut inactive = challenge(None);
        inactive.active = false;
        let challenges = vec![inactive];

        assert!(visible_to(&challenges, 7, &requester("dave", false)).is_none());
        assert!(visible_to(&challenges, 7, &requester("erin", true)).is_some());
        assert!(visible_to(&challenges, 8, &requester("erin", true)).is_none());
    }

    #[test]
    fn test_solve_request_defaults() {
        let request: SolveRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request.code, "");
        assert_eq!(request.language, "python");

        let request: SolveRequest =
            serde_json::from_str(r#"{"code": "print(1)", "language": "cpp"}"#).unwrap();
        assert_eq!(request.code, "print(1)");
        assert_eq!(request.language, "cpp");
    }

    #[test]
    fn test_grading_error_status_codes() {
        let timed_out = JudgeError::Execution {
            index: 2,
            result: ExecutionResult::timed_out(String::new(), "slow".to_string()),
        };
        assert_eq!(
            grading_error_response(timed_out).status(),
            StatusCode::REQUEST_TIMEOUT
        );

        let compile = JudgeError::Execution {
            index: 0,
            result: ExecutionResult::compile_error(String::new(), "bad".to_string(), 1),
        };
        assert_eq!(
            grading_error_response(compile).status(),
            StatusCode::BAD_REQUEST
        );

        assert_eq!(
            grading_error_response(JudgeError::NoTestCases).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            grading_error_response(JudgeError::Execution {
                index: 0,
                result: ExecutionResult::internal_error("spawn failed".to_string()),
            })
            .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
