use actix_web::{HttpResponse, Responder, get, web};
use sqlx::sqlite::SqlitePool;

use super::{Requester, database_error_response};
use crate::database as db;

/// Solutions of the requesting user, one per attempted challenge
#[get("/solutions")]
pub async fn get_solutions_handler(
    requester: Requester,
    pool: web::Data<SqlitePool>,
) -> impl Responder {
    match db::fetch_user_solutions(pool.get_ref(), &requester.user_id).await {
        Ok(solutions) => {
            log::info!("Got {} solutions of {}", solutions.len(), requester.user_id);
            HttpResponse::Ok().json(solutions)
        }
        Err(e) => {
            log::error!("Failed to retrieve solutions: {e}");
            database_error_response()
        }
    }
}

#[get("/submissions")]
pub async fn get_submissions_handler(
    requester: Requester,
    pool: web::Data<SqlitePool>,
) -> impl Responder {
    match db::fetch_submissions(pool.get_ref(), &requester.user_id).await {
        Ok(submissions) => HttpResponse::Ok().json(submissions),
        Err(e) => {
            log::error!("Failed to retrieve submissions: {e}");
            database_error_response()
        }
    }
}
