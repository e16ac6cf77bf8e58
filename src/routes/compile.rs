use actix_web::http::StatusCode;
use actix_web::{HttpResponse, Responder, post, web};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use tokio::sync::oneshot;

use super::{
    ErrorResponseWithMessage, Requester, database_error_response, queue_full_response,
    worker_lost_response,
};
use crate::database::{self as db, SubmissionRecord};
use crate::model::{ExecutionRequest, ExecutionResult, Outcome};
use crate::queue::{JobMessage, JobQueue};
use crate::sandbox::ResourceLimits;
use crate::toolchain::ToolchainRegistry;

#[derive(Deserialize, Debug)]
pub struct CompileRequest {
    #[serde(default)]
    pub code: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub stdin: String,
}

pub(crate) fn default_language() -> String {
    "python".to_string()
}

#[derive(Serialize)]
struct CompileResponse {
    result: ExecutionResult,
    submission: SubmissionRecord,
}

#[post("/compile")]
pub async fn post_compile_handler(
    requester: Requester,
    registry: web::Data<ToolchainRegistry>,
    limits: web::Data<ResourceLimits>,
    job_queue: web::Data<JobQueue>,
    pool: web::Data<SqlitePool>,
    body: web::Json<CompileRequest>,
) -> impl Responder {
    let body = body.into_inner();

    // Rejected before anything is spawned
    let toolchain = match registry.lookup(&body.language) {
        Ok(toolchain) => toolchain,
        Err(e) => {
            log::info!("Rejected compile request from {}: {e}", requester.user_id);
            return HttpResponse::BadRequest().json(ErrorResponseWithMessage {
                reason: "ERR_INVALID_ARGUMENT",
                code: 1,
                message: "Unsupported language.".to_string(),
            });
        }
    };
    let language = toolchain.name.clone();

    let (tx, rx) = oneshot::channel::<ExecutionResult>();
    let job_message = JobMessage::Execute {
        toolchain,
        request: ExecutionRequest {
            language: language.clone(),
            source_code: body.code.clone(),
            stdin: body.stdin.clone(),
            time_limit: limits.run_time,
        },
        responder: tx,
    };

    if job_queue.try_push(job_message).await.is_err() {
        return queue_full_response();
    }
    log::debug!("Sent execute job for {} to queue", requester.user_id);

    let result = match rx.await {
        Ok(result) => result,
        Err(e) => {
            log::error!("Failed to receive execution result: {e}");
            return worker_lost_response();
        }
    };

    let submission = match db::save_submission(
        pool.get_ref(),
        &requester.user_id,
        &language,
        &body.code,
        &body.stdin,
        &result,
    )
    .await
    {
        Ok(submission) => {
            log::info!("Stored submission {} of {}", submission.id, requester.user_id);
            submission
        }
        Err(e) => {
            log::error!("Failed to store submission: {e}");
            return database_error_response();
        }
    };

    let status = match result.outcome {
        Outcome::Completed | Outcome::CompileError => StatusCode::OK,
        Outcome::TimedOut => StatusCode::REQUEST_TIMEOUT,
        Outcome::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    };
    HttpResponse::build(status).json(CompileResponse { result, submission })
}
