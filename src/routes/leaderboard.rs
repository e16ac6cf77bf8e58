use actix_web::{HttpResponse, Responder, get, web};
use sqlx::sqlite::SqlitePool;

use super::{Requester, database_error_response};
use crate::database as db;

#[get("/leaderboard")]
pub async fn get_leaderboard_handler(
    _requester: Requester,
    pool: web::Data<SqlitePool>,
) -> impl Responder {
    match db::fetch_leaderboard(pool.get_ref()).await {
        Ok(entries) => HttpResponse::Ok().json(entries),
        Err(e) => {
            log::error!("Failed to get leaderboard: {e}");
            database_error_response()
        }
    }
}
