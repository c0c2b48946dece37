use crate::interface::stream::CancellationToken;
use crate::prelude::{SenseError, SenseResult};
use crate::telemetry::log::LogManager;
use std::fmt;
use std::sync::Arc;
use tokio::runtime::Builder;
use tokio::sync::Semaphore;

/// Terminal status of one pool task.
#[derive(Debug)]
pub enum TaskStatus<R> {
    Completed(R),
    Failed(String),
    /// Cancelled before it started.
    Cancelled,
}

#[derive(Debug)]
pub struct TaskOutcome<R> {
    pub index: usize,
    pub label: String,
    pub status: TaskStatus<R>,
}

impl<R> TaskOutcome<R> {
    pub fn is_completed(&self) -> bool {
        matches!(self.status, TaskStatus::Completed(_))
    }
}

/// Fixed-size pool running independent campaign tasks on blocking threads.
///
/// At most `size` tasks run at once. Cancellation is checked when a task
/// acquires its slot, so running tasks always finish.
pub struct CampaignPool {
    size: usize,
    cancel: CancellationToken,
    logger: LogManager,
}

impl CampaignPool {
    pub fn new(size: usize) -> SenseResult<Self> {
        if size == 0 {
            return Err(SenseError::Precondition("pool size must be positive".into()));
        }
        Ok(Self {
            size,
            cancel: CancellationToken::new(),
            logger: LogManager::new("pool"),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Token that cancels every task which has not started yet.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs `job` over `tasks`, returning one outcome per task in input order.
    ///
    /// A failing task is logged with its label and does not affect the others.
    pub fn run<T, R, E, F>(
        &self,
        tasks: Vec<(String, T)>,
        job: F,
    ) -> SenseResult<Vec<TaskOutcome<R>>>
    where
        T: Send + 'static,
        R: Send + 'static,
        E: fmt::Display + Send + 'static,
        F: Fn(T) -> Result<R, E> + Send + Sync + 'static,
    {
        let runtime = Builder::new_multi_thread()
            .worker_threads(self.size)
            .max_blocking_threads(self.size)
            .thread_name("campaign-pool")
            .build()?;
        let job = Arc::new(job);
        let slots = Arc::new(Semaphore::new(self.size));

        self.logger.record(&format!(
            "running {} tasks on {} slots",
            tasks.len(),
            self.size
        ));

        let outcomes = runtime.block_on(async {
            let mut handles = Vec::with_capacity(tasks.len());
            for (index, (label, task)) in tasks.into_iter().enumerate() {
                let job = Arc::clone(&job);
                let slots = Arc::clone(&slots);
                let cancel = self.cancel.clone();
                let logger = self.logger.clone();
                let task_label = label.clone();

                let handle = tokio::spawn(async move {
                    let _slot = match slots.acquire_owned().await {
                        Ok(slot) => slot,
                        Err(_) => return TaskStatus::Failed("pool closed".into()),
                    };
                    if cancel.is_cancelled() {
                        return TaskStatus::Cancelled;
                    }
                    logger.record(&format!("starting {}", task_label));
                    match tokio::task::spawn_blocking(move || job(task)).await {
                        Ok(Ok(result)) => TaskStatus::Completed(result),
                        Ok(Err(err)) => TaskStatus::Failed(format!("{:#}", err)),
                        Err(join) => TaskStatus::Failed(format!("task panicked: {}", join)),
                    }
                });
                handles.push((index, label, handle));
            }

            let mut outcomes = Vec::with_capacity(handles.len());
            for (index, label, handle) in handles {
                let status = handle
                    .await
                    .unwrap_or_else(|err| TaskStatus::Failed(format!("task aborted: {}", err)));
                match &status {
                    TaskStatus::Failed(reason) => {
                        log::error!("[pool] task {} ({}) failed: {}", index, label, reason)
                    }
                    TaskStatus::Cancelled => self.logger.warn(&format!("{} cancelled", label)),
                    TaskStatus::Completed(_) => self.logger.detail(&format!("{} done", label)),
                }
                outcomes.push(TaskOutcome {
                    index,
                    label,
                    status,
                });
            }
            outcomes
        });
        Ok(outcomes)
    }
}
