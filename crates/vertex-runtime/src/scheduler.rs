//! Single scheduler for every periodic background task.
//!
//! Lifecycle checks, pool sweeps, catalog re-indexing and provider hot
//! reload all run from one timer loop. A task that is still running when its
//! next tick arrives is skipped for that tick rather than overlapped.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info};
use vertex_core::Result;

type TaskFn = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

const MIN_PERIOD: Duration = Duration::from_millis(10);

struct PeriodicTask {
    name: String,
    period: Duration,
    run: TaskFn,
    busy: Arc<AtomicBool>,
}

#[derive(Default)]
pub struct Scheduler {
    tasks: Vec<PeriodicTask>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` every `period`, first after one full period.
    pub fn every<F, Fut>(&mut self, name: impl Into<String>, period: Duration, task: F) -> &mut Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.tasks.push(PeriodicTask {
            name: name.into(),
            period: period.max(MIN_PERIOD),
            run: Arc::new(move || task().boxed()),
            busy: Arc::new(AtomicBool::new(false)),
        });
        self
    }

    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.name.as_str()).collect()
    }

    /// Start the timer loop. Abort the returned handle to stop it.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        let start = Instant::now();
        let mut due: Vec<Instant> = self.tasks.iter().map(|t| start + t.period).collect();
        info!("Scheduler started with {} tasks", self.tasks.len());

        loop {
            let Some((idx, at)) = due.iter().copied().enumerate().min_by_key(|(_, at)| *at) else {
                return;
            };
            tokio::time::sleep_until(at).await;

            let task = &self.tasks[idx];
            if task.busy.swap(true, Ordering::AcqRel) {
                debug!("Task {} still running, skipping tick", task.name);
            } else {
                let run = task.run.clone();
                let busy = task.busy.clone();
                let name = task.name.clone();
                tokio::spawn(async move {
                    if let Err(e) = run().await {
                        error!("Scheduled task {} failed: {}", name, e);
                    }
                    busy.store(false, Ordering::Release);
                });
            }

            let next = at + task.period;
            let now = Instant::now();
            due[idx] = if next > now { next } else { now + task.period };
        }
    }
}
