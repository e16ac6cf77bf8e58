use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::grading::GradingEngine;
use crate::queue::{JobMessage, JobQueue};
use crate::sandbox::SandboxRunner;

pub async fn worker(
    id: usize,
    engine: Arc<GradingEngine>,
    runner: Arc<dyn SandboxRunner>,
    queue: Arc<JobQueue>,
    token: CancellationToken,
) -> anyhow::Result<()> {
    log::info!("Worker {id} initialized");

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                log::info!("Worker {id} received shutdown signal, stopping");
                break;
            }

            job_message = queue.pop() => {
                let kind = job_message.kind();
                log::debug!("Worker {id} got {kind} job from queue, {} still waiting", queue.len().await);

                match job_message {
                    JobMessage::Execute { toolchain, request, responder } => {
                        log::debug!("Worker {id} executing {} code", request.language);
                        let runner = Arc::clone(&runner);
                        let handle = tokio::task::spawn_blocking(move || {
                            runner.run(&toolchain, &request.source_code, &request.stdin, request.time_limit)
                        });

                        match handle.await {
                            Ok(result) => {
                                log::info!("Execute job finished on worker {id} with outcome {}", result.outcome);
                                if responder.send(result).is_err() {
                                    log::warn!("Failed to send execute result back from worker {id}");
                                }
                            }
                            Err(e) => log::error!("Execute job panicked on worker {id}: {e:?}"),
                        }
                    }

                    JobMessage::Grade { request, responder } => {
                        let engine = Arc::clone(&engine);
                        let handle = tokio::task::spawn_blocking(move || {
                            engine.grade(
                                &request.language,
                                &request.source_code,
                                &request.test_cases,
                                request.privileged,
                            )
                        });

                        match handle.await {
                            Ok(verdict) => {
                                log::info!("Grade job finished on worker {id}, ok: {}", verdict.is_ok());
                                if responder.send(verdict).is_err() {
                                    log::warn!("Failed to send grade result back from worker {id}");
                                }
                            }
                            Err(e) => log::error!("Grade job panicked on worker {id}: {e:?}"),
                        }
                    }
                }
            }
        };
    }

    log::info!("Worker {id} has shut down gracefully");
    Ok(())
}
