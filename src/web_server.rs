use std::sync::Arc;

use actix_web::{App, HttpServer, dev::Server, middleware, web};
use sqlx::sqlite::SqlitePool;

use crate::config::{ChallengeConfig, ServerConfig};
use crate::queue::JobQueue;
use crate::routes::{self, json_error_handler, query_error_handler};
use crate::sandbox::ResourceLimits;
use crate::toolchain::ToolchainRegistry;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ToolchainRegistry>,
    pub limits: ResourceLimits,
    pub challenges: Vec<ChallengeConfig>,
    pub job_queue: Arc<JobQueue>,
    pub db_pool: SqlitePool,
}

impl AppState {
    /// Registers the state on an app, also used by the integration tests
    pub fn register(&self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(web::Data::from(self.registry.clone()))
            .app_data(web::Data::new(self.limits.clone()))
            .app_data(web::Data::new(self.challenges.clone()))
            .app_data(web::Data::from(self.job_queue.clone()))
            .app_data(web::Data::new(self.db_pool.clone()))
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .app_data(web::QueryConfig::default().error_handler(query_error_handler));
    }
}

pub fn build_server(server_config: ServerConfig, state: AppState) -> std::io::Result<Server> {
    let ServerConfig {
        bind_address,
        bind_port,
    } = server_config;

    let server = HttpServer::new(move || {
        let state = state.clone();
        App::new()
            .wrap(middleware::Logger::default())
            .configure(move |cfg| state.register(cfg))
            .configure(routes::configure)
    })
    .bind((
        bind_address.unwrap_or_else(|| "127.0.0.1".to_string()),
        bind_port.unwrap_or(12345),
    ))?
    .run();

    Ok(server)
}
