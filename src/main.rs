use std::sync::Arc;

use clap::Parser;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use judgebox::config::{CliArgs, Config};
use judgebox::database as db;
use judgebox::grading::GradingEngine;
use judgebox::queue::JobQueue;
use judgebox::sandbox::create_sandbox_runner;
use judgebox::toolchain::ToolchainRegistry;
use judgebox::web_server::{AppState, build_server};
use judgebox::worker::worker;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = CliArgs::parse();
    let n_workers = cli.worker_count();

    if n_workers == 0 {
        panic!("The number of workers must not be 0");
    }

    let Config {
        server: server_config,
        limits,
        languages,
        challenges,
    } = cli.to_config()?;

    let registry = Arc::new(ToolchainRegistry::with_overrides(languages)?);
    log::info!(
        "Supported languages: {}",
        registry.names().collect::<Vec<_>>().join(", ")
    );

    let runner = create_sandbox_runner(limits.workspace_root(), limits.resource_limits())?;
    let engine = Arc::new(GradingEngine::new(
        registry.clone(),
        runner.clone(),
        limits.grading_time_limit_ms.into(),
    ));

    let db_path = cli.database.clone().unwrap_or_else(db::get_db_path);
    if cli.flush_data {
        db::remove_db(&db_path);
    }
    let db_pool = db::init_db(&db_path).await?;

    let job_queue = Arc::new(JobQueue::new(limits.queue_capacity));
    let shutdown_token = CancellationToken::new();

    // ======= PREPARATION END, EXECUTION START =======

    let mut workers = JoinSet::new();
    for i in 1..=n_workers {
        workers.spawn(worker(
            i,
            engine.clone(),
            runner.clone(),
            job_queue.clone(),
            shutdown_token.clone(),
        ));
    }
    log::info!("Started {n_workers} workers");

    let state = AppState {
        registry,
        limits: limits.resource_limits(),
        challenges,
        job_queue,
        db_pool,
    };
    let server = build_server(server_config, state)?;

    let server_handle = server.handle();
    let server_task = actix_web::rt::spawn(server);

    // ===== EXECUTION END, WAITING FOR SHUTDOWN ======

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("Ctrl-c received, shutting down...");
        }
        res_server = server_task => {
            log::error!("Server terminated unexpectedly: {:?}", res_server);
        }
        Some(res_worker) = workers.join_next() => {
            log::error!("A worker terminated unexpectedly: {:?}", res_worker);
        }
    }

    server_handle.stop(true).await;

    shutdown_token.cancel();
    log::info!("Shutdown signal sent to workers, waiting for them to finish...");

    while let Some(res) = workers.join_next().await {
        match res {
            Ok(Err(e)) => log::error!("Worker finished with error: {e:?}"),
            Err(e) if e.is_panic() => log::error!("Worker panicked: {e:?}"),
            Err(e) => log::error!("Worker handle failed: {e:?}"),
            Ok(Ok(())) => {}
        }
    }

    log::info!("Shutdown complete");
    Ok(())
}
