use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_cron_scheduler::{Job, JobScheduler as CronScheduler};
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use vault_keeper_core::{JobRunRecord, JobRunStatus, KeeperStore};

use crate::handler::{JobHandler, JobReport};
use crate::slot::SlotTracker;

#[derive(Clone)]
struct ScheduledTask {
    name: String,
    interval: Duration,
    handler: Arc<dyn JobHandler>,
}

/// Shared by every fire of every task.
struct Runner {
    store: Arc<dyn KeeperStore>,
    job_timeout: Duration,
    slots: SlotTracker,
}

impl Runner {
    async fn fire(&self, task: &ScheduledTask) {
        let Some(slot_key) = self.slots.claim(&task.name, Instant::now(), task.interval) else {
            debug!(job = %task.name, "Slot already started, skipping duplicate fire");
            return;
        };
        self.invoke(task, slot_key).await;
    }

    /// Runs the handler once and records the outcome. Never fails: handler
    /// errors, panics and timeouts all become a FAILURE run.
    async fn invoke(&self, task: &ScheduledTask, slot_key: String) -> JobRunRecord {
        let start_time = Utc::now();
        let started = Instant::now();

        let handler = Arc::clone(&task.handler);
        let mut handle = tokio::spawn(async move { handler.run().await });

        let outcome: Result<JobReport, String> =
            match tokio::time::timeout(self.job_timeout, &mut handle).await {
                Ok(Ok(Ok(report))) => Ok(report),
                Ok(Ok(Err(e))) => Err(format!("{e:#}")),
                Ok(Err(join_err)) if join_err.is_panic() => Err("handler panicked".to_string()),
                Ok(Err(join_err)) => Err(format!("handler cancelled: {join_err}")),
                Err(_) => {
                    handle.abort();
                    Err(format!("timed out after {}s", self.job_timeout.as_secs()))
                }
            };

        let duration_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
        let (status, report, error) = match outcome {
            Ok(report) => (JobRunStatus::Success, report, None),
            Err(e) => (JobRunStatus::Failure, JobReport::default(), Some(e)),
        };

        let run = JobRunRecord {
            id: Uuid::new_v4(),
            worker_name: task.name.clone(),
            slot_key,
            status,
            start_time,
            duration_ms,
            processed: i32::try_from(report.processed).unwrap_or(i32::MAX),
            failed: i32::try_from(report.failed).unwrap_or(i32::MAX),
            error,
        };

        match &run.error {
            None => info!(
                job = %run.worker_name,
                slot = %run.slot_key,
                duration_ms = run.duration_ms,
                %report,
                "Job run finished"
            ),
            Some(e) => error!(
                job = %run.worker_name,
                slot = %run.slot_key,
                duration_ms = run.duration_ms,
                error = %e,
                "Job run failed"
            ),
        }

        if let Err(e) = self.store.record_job_run(&run).await {
            warn!(job = %run.worker_name, error = %e, "Failed to record job run");
        }
        run
    }
}

/// Runs registered handlers on fixed intervals.
///
/// Each task fires once when the scheduler starts and then every interval.
/// A fire that lands on a slot the task already started is dropped. Every
/// invocation produces exactly one [`JobRunRecord`].
pub struct JobScheduler {
    tasks: Vec<ScheduledTask>,
    runner: Arc<Runner>,
    cron: Option<CronScheduler>,
}

impl JobScheduler {
    #[must_use]
    pub fn new(store: Arc<dyn KeeperStore>, job_timeout: Duration) -> Self {
        Self {
            tasks: Vec::new(),
            runner: Arc::new(Runner {
                store,
                job_timeout,
                slots: SlotTracker::new(Instant::now()),
            }),
            cron: None,
        }
    }

    /// Registers a task.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is taken, the interval is zero, or the
    /// scheduler is already running.
    pub fn schedule(
        &mut self,
        name: impl Into<String>,
        interval: Duration,
        handler: Arc<dyn JobHandler>,
    ) -> Result<()> {
        let name = name.into();
        if self.cron.is_some() {
            bail!("cannot schedule '{name}' on a running scheduler");
        }
        if interval.is_zero() {
            bail!("interval for '{name}' must be positive");
        }
        if self.tasks.iter().any(|t| t.name == name) {
            bail!("job '{name}' is already scheduled");
        }
        info!(job = %name, interval_secs = interval.as_secs(), "Scheduled job");
        self.tasks.push(ScheduledTask {
            name,
            interval,
            handler,
        });
        Ok(())
    }

    #[must_use]
    pub fn job_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.name.as_str()).collect()
    }

    /// Starts firing every registered task.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying scheduler cannot be created or
    /// started.
    pub async fn start(&mut self) -> Result<()> {
        if self.cron.is_some() {
            bail!("scheduler already started");
        }

        let cron = CronScheduler::new()
            .await
            .context("Failed to create job scheduler")?;

        for task in &self.tasks {
            let runner = Arc::clone(&self.runner);
            let scheduled = task.clone();
            let job = Job::new_repeated_async(task.interval, move |_uuid, _lock| {
                let runner = Arc::clone(&runner);
                let task = scheduled.clone();
                Box::pin(async move {
                    runner.fire(&task).await;
                })
            })
            .with_context(|| format!("Failed to create job '{}'", task.name))?;
            cron.add(job)
                .await
                .with_context(|| format!("Failed to add job '{}'", task.name))?;
        }

        self.runner.slots.restart(Instant::now());
        cron.start().await.context("Failed to start job scheduler")?;
        info!(jobs = self.tasks.len(), "Job scheduler started");

        // Slot 0 of every task runs right away.
        for task in &self.tasks {
            let runner = Arc::clone(&self.runner);
            let task = task.clone();
            tokio::spawn(async move {
                runner.fire(&task).await;
            });
        }

        self.cron = Some(cron);
        Ok(())
    }

    /// Runs a task immediately, outside its schedule.
    ///
    /// # Errors
    ///
    /// Returns an error if no task has that name. Handler failures are
    /// reported in the returned record.
    pub async fn run_now(&self, name: &str) -> Result<JobRunRecord> {
        let Some(task) = self.tasks.iter().find(|t| t.name == name) else {
            bail!("unknown job '{name}'");
        };
        let slot_key = format!("{name}@manual-{}", Utc::now().timestamp_millis());
        Ok(self.runner.invoke(task, slot_key).await)
    }

    /// Stops firing. In-flight invocations run to completion or timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying scheduler fails to shut down.
    pub async fn shutdown(&mut self) -> Result<()> {
        if let Some(mut cron) = self.cron.take() {
            cron.shutdown()
                .await
                .context("Failed to shut down job scheduler")?;
            info!("Job scheduler stopped");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vault_keeper_data::MemoryStore;

    struct Counting {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl JobHandler for Counting {
        async fn run(&self) -> Result<JobReport> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(JobReport {
                processed: 3,
                transitioned: 2,
                skipped: 1,
                failed: 0,
            })
        }
    }

    struct Failing;

    #[async_trait]
    impl JobHandler for Failing {
        async fn run(&self) -> Result<JobReport> {
            bail!("database unreachable")
        }
    }

    struct Panicking;

    #[async_trait]
    impl JobHandler for Panicking {
        async fn run(&self) -> Result<JobReport> {
            panic!("boom")
        }
    }

    struct Slow;

    #[async_trait]
    impl JobHandler for Slow {
        async fn run(&self) -> Result<JobReport> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(JobReport::default())
        }
    }

    fn scheduler(store: &Arc<MemoryStore>, timeout: Duration) -> JobScheduler {
        JobScheduler::new(Arc::clone(store) as Arc<dyn KeeperStore>, timeout)
    }

    #[tokio::test]
    async fn test_successful_run_is_recorded() {
        let store = Arc::new(MemoryStore::new());
        let mut sched = scheduler(&store, Duration::from_secs(5));
        sched
            .schedule(
                "entry",
                Duration::from_secs(30),
                Arc::new(Counting {
                    calls: AtomicUsize::new(0),
                }),
            )
            .unwrap();

        let run = sched.run_now("entry").await.unwrap();
        assert_eq!(run.status, JobRunStatus::Success);
        assert_eq!(run.processed, 3);
        assert!(run.error.is_none());

        let runs = store.job_runs().await;
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].worker_name, "entry");
    }

    #[tokio::test]
    async fn test_failures_become_failure_runs() {
        let store = Arc::new(MemoryStore::new());
        let mut sched = scheduler(&store, Duration::from_millis(200));
        sched.schedule("failing", Duration::from_secs(30), Arc::new(Failing)).unwrap();
        sched.schedule("panicking", Duration::from_secs(30), Arc::new(Panicking)).unwrap();
        sched.schedule("slow", Duration::from_secs(30), Arc::new(Slow)).unwrap();

        let failing = sched.run_now("failing").await.unwrap();
        assert_eq!(failing.status, JobRunStatus::Failure);
        assert!(failing.error.unwrap().contains("database unreachable"));

        let panicking = sched.run_now("panicking").await.unwrap();
        assert_eq!(panicking.status, JobRunStatus::Failure);
        assert_eq!(panicking.error.as_deref(), Some("handler panicked"));

        let slow = sched.run_now("slow").await.unwrap();
        assert_eq!(slow.status, JobRunStatus::Failure);
        assert!(slow.error.unwrap().contains("timed out"));

        assert_eq!(store.job_runs().await.len(), 3);
    }

    #[tokio::test]
    async fn test_schedule_rejects_bad_registrations() {
        let store = Arc::new(MemoryStore::new());
        let mut sched = scheduler(&store, Duration::from_secs(5));
        assert!(sched.schedule("entry", Duration::ZERO, Arc::new(Failing)).is_err());
        sched.schedule("entry", Duration::from_secs(1), Arc::new(Failing)).unwrap();
        assert!(sched.schedule("entry", Duration::from_secs(1), Arc::new(Failing)).is_err());
        assert!(sched.run_now("missing").await.is_err());
        assert_eq!(sched.job_names(), vec!["entry"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_started_scheduler_fires_repeatedly() {
        let store = Arc::new(MemoryStore::new());
        let handler = Arc::new(Counting {
            calls: AtomicUsize::new(0),
        });
        let mut sched = scheduler(&store, Duration::from_secs(5));
        sched
            .schedule("valuation", Duration::from_secs(1), Arc::clone(&handler) as Arc<dyn JobHandler>)
            .unwrap();

        sched.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        sched.shutdown().await.unwrap();

        assert!(handler.calls.load(Ordering::SeqCst) >= 2);
        let runs = store.job_runs().await;
        assert!(runs.len() >= 2);
        let mut keys: Vec<_> = runs.iter().map(|r| r.slot_key.clone()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), runs.len());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_slots_count_from_start_not_construction() {
        let store = Arc::new(MemoryStore::new());
        let mut sched = scheduler(&store, Duration::from_secs(5));
        sched
            .schedule(
                "valuation",
                Duration::from_secs(2),
                Arc::new(Counting {
                    calls: AtomicUsize::new(0),
                }),
            )
            .unwrap();

        // Idle for more than half an interval before starting.
        tokio::time::sleep(Duration::from_millis(1200)).await;
        let before_start = Instant::now();
        sched.start().await.unwrap();
        assert!(sched.runner.slots.origin() >= before_start);

        tokio::time::sleep(Duration::from_millis(300)).await;
        sched.shutdown().await.unwrap();

        let runs = store.job_runs().await;
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].slot_key, "valuation@0");
    }
}
