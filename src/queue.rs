use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify, oneshot};

use crate::error::JudgeError;
use crate::grading::GradeRequest;
use crate::model::{ExecutionRequest, ExecutionResult, Verdict};
use crate::toolchain::ToolchainDescriptor;

pub enum JobMessage {
    /// Single run with an already resolved toolchain
    Execute {
        toolchain: Arc<ToolchainDescriptor>,
        request: ExecutionRequest,
        responder: oneshot::Sender<ExecutionResult>,
    },
    Grade {
        request: GradeRequest,
        responder: oneshot::Sender<Result<Verdict, JudgeError>>,
    },
}

impl JobMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Execute { .. } => "execute",
            Self::Grade { .. } => "grade",
        }
    }
}

/// Bounded FIFO between the transport and the workers
///
/// At most `capacity` jobs wait at a time; [`JobQueue::try_push`] hands the
/// job back when the queue is full so the caller can reject the request.
pub struct JobQueue {
    queue: Mutex<VecDeque<JobMessage>>,
    notify: Notify,
    capacity: usize,
}

impl JobQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            capacity,
        }
    }

    pub async fn try_push(&self, job: JobMessage) -> Result<(), JobMessage> {
        {
            let mut queue = self.queue.lock().await;
            if queue.len() >= self.capacity {
                log::warn!(
                    "Job queue full ({} waiting), rejecting {} job",
                    queue.len(),
                    job.kind()
                );
                return Err(job);
            }
            queue.push_back(job);
        }
        self.notify.notify_one();
        Ok(())
    }

    pub async fn pop(&self) -> JobMessage {
        loop {
            if let Some(job) = self.queue.lock().await.pop_front() {
                return job;
            }
            self.notify.notified().await;
        }
    }

    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn grade_job(language: &str) -> (JobMessage, oneshot::Receiver<Result<Verdict, JudgeError>>) {
        let (tx, rx) = oneshot::channel();
        let job = JobMessage::Grade {
            request: GradeRequest {
                language: language.to_string(),
                source_code: String::new(),
                test_cases: Vec::new(),
                privileged: false,
            },
            responder: tx,
        };
        (job, rx)
    }

    fn language_of(job: &JobMessage) -> &str {
        match job {
            JobMessage::Grade { request, .. } => &request.language,
            JobMessage::Execute { request, .. } => &request.language,
        }
    }

    #[tokio::test]
    async fn test_queue_is_fifo() {
        let queue = JobQueue::new(4);
        for language in ["a", "b", "c"] {
            assert!(queue.try_push(grade_job(language).0).await.is_ok());
        }
        assert_eq!(queue.len().await, 3);

        assert_eq!(language_of(&queue.pop().await), "a");
        assert_eq!(language_of(&queue.pop().await), "b");
        assert_eq!(language_of(&queue.pop().await), "c");
        assert_eq!(queue.len().await, 0);
    }

    #[tokio::test]
    async fn test_full_queue_hands_job_back() {
        let queue = JobQueue::new(1);
        assert!(queue.try_push(grade_job("first").0).await.is_ok());

        let rejected = queue.try_push(grade_job("second").0).await.unwrap_err();
        assert_eq!(language_of(&rejected), "second");

        queue.pop().await;
        assert!(queue.try_push(grade_job("third").0).await.is_ok());
    }

    #[tokio::test]
    async fn test_pop_waits_for_push() {
        let queue = Arc::new(JobQueue::new(2));
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { language_of(&queue.pop().await).to_string() })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.try_push(grade_job("late").0).await.ok();

        assert_eq!(consumer.await.unwrap(), "late");
    }
}
