mod challenges;
mod compile;
mod leaderboard;
mod users;

pub use challenges::{
    ChallengeView, SolveRequest, get_challenge_handler, get_challenges_handler, post_solve_handler,
};
pub use compile::{CompileRequest, post_compile_handler};
pub use leaderboard::get_leaderboard_handler;
pub use users::{get_solutions_handler, get_submissions_handler};

use std::future::{Ready, ready};

use actix_web::dev::Payload;
use actix_web::error::{InternalError, JsonPayloadError, QueryPayloadError};
use actix_web::http::header::HeaderMap;
use actix_web::{FromRequest, HttpRequest, HttpResponse, web};
use serde::Serialize;

/// Header carrying the opaque identity of the authenticated caller
pub const USER_ID_HEADER: &str = "X-User-Id";
/// Header marking the caller as privileged (`true` or `1`)
pub const PRIVILEGED_HEADER: &str = "X-User-Privileged";

#[derive(Serialize)]
struct ErrorResponse {
    reason: &'static str,
    code: u32,
}

#[derive(Serialize)]
struct ErrorResponseWithMessage {
    reason: &'static str,
    code: u32,
    message: String,
}

pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = HttpResponse::BadRequest().json(ErrorResponse {
        reason: "ERR_INVALID_ARGUMENT",
        code: 1,
    });
    InternalError::from_response(err, response).into()
}

pub fn query_error_handler(err: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = HttpResponse::BadRequest().json(ErrorResponse {
        reason: "ERR_INVALID_ARGUMENT",
        code: 1,
    });
    InternalError::from_response(err, response).into()
}

/// Registers every endpoint of the judge
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(post_compile_handler)
        .service(get_challenges_handler)
        .service(get_challenge_handler)
        .service(post_solve_handler)
        .service(get_leaderboard_handler)
        .service(get_solutions_handler)
        .service(get_submissions_handler);
}

/// Caller identity as asserted by the upstream gateway
///
/// The value is trusted verbatim; this service never authenticates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    pub user_id: String,
    pub privileged: bool,
}

impl Requester {
    fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let user_id = headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())?;

        let privileged = headers
            .get(PRIVILEGED_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| {
                let v = v.trim();
                v == "1" || v.eq_ignore_ascii_case("true")
            });

        Some(Self {
            user_id: user_id.to_string(),
            privileged,
        })
    }
}

impl FromRequest for Requester {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Self::from_headers(req.headers()).ok_or_else(|| {
            let response = HttpResponse::BadRequest().json(ErrorResponseWithMessage {
                reason: "ERR_INVALID_ARGUMENT",
                code: 1,
                message: format!("Missing {USER_ID_HEADER} header."),
            });
            actix_web::Error::from(InternalError::from_response(
                "missing caller identity",
                response,
            ))
        }))
    }
}

fn queue_full_response() -> HttpResponse {
    HttpResponse::ServiceUnavailable().json(ErrorResponseWithMessage {
        reason: "ERR_RATE_LIMIT",
        code: 4,
        message: "Too many pending jobs, try again later.".to_string(),
    })
}

fn worker_lost_response() -> HttpResponse {
    HttpResponse::InternalServerError().json(ErrorResponse {
        reason: "ERR_INTERNAL",
        code: 6,
    })
}

fn database_error_response() -> HttpResponse {
    HttpResponse::InternalServerError().json(ErrorResponse {
        reason: "ERR_EXTERNAL",
        code: 5,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_requester_from_headers() {
        let req = TestRequest::default()
            .insert_header((USER_ID_HEADER, "alice"))
            .insert_header((PRIVILEGED_HEADER, "TRUE"))
            .to_http_request();
        assert_eq!(
            Requester::from_headers(req.headers()),
            Some(Requester {
                user_id: "alice".to_string(),
                privileged: true,
            })
        );

        let req = TestRequest::default()
            .insert_header((USER_ID_HEADER, "bob"))
            .insert_header((PRIVILEGED_HEADER, "no"))
            .to_http_request();
        assert!(!Requester::from_headers(req.headers()).unwrap().privileged);
    }

    #[test]
    fn test_requester_requires_user_id() {
        let req = TestRequest::default().to_http_request();
        assert_eq!(Requester::from_headers(req.headers()), None);

        let req = TestRequest::default()
            .insert_header((USER_ID_HEADER, "   "))
            .to_http_request();
        assert_eq!(Requester::from_headers(req.headers()), None);
    }
}
