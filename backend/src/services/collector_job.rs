//! Recurring channel-stats collector.
//!
//! Each run reloads the roster, refreshes every tracked channel through the
//! channel-stats stage, merges the results back by channel id under one shared
//! `fetched_at`, rewrites the roster and appends one history snapshot per
//! updated channel. Runs hold the roster lock for their whole duration, so a
//! manual `run_now` and a cron tick never interleave their writes. A failed run
//! is reported and not retried; the next cron fire is the retry.

use crate::error::{CollectorError, Result};
use crate::models::{RunSummary, SchedulerStatus};
use crate::services::cancel::CancelToken;
use crate::services::roster::{merge_stats, ChannelRoster};
use crate::services::stages::StageFetchers;
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

pub const JOB_NAME: &str = "channel-stats";

/// Five-field crontab expressions get a leading seconds field.
pub fn normalize_cron(expression: &str) -> Result<String> {
    let expression = expression.trim();
    match expression.split_whitespace().count() {
        5 => Ok(format!("0 {expression}")),
        6 | 7 => Ok(expression.to_string()),
        n => Err(CollectorError::Configuration(format!(
            "invalid cron expression '{expression}': expected 5 to 7 fields, got {n}"
        ))),
    }
}

struct RegisteredJob {
    id: Uuid,
    schedule: String,
}

struct RunningFlag<'a>(&'a AtomicBool);

impl<'a> RunningFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        RunningFlag(flag)
    }
}

impl Drop for RunningFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct Runner {
    roster: Arc<ChannelRoster>,
    stages: StageFetchers,
    is_running: AtomicBool,
    last_run: Mutex<Option<DateTime<Utc>>>,
    // Shared by every run started since the last stop.
    cancel: Mutex<CancelToken>,
}

impl Runner {
    fn current_token(&self) -> CancelToken {
        self.cancel
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Fires the token of all in-flight runs and arms a fresh one.
    fn cancel_in_flight(&self) {
        let mut cancel = self.cancel.lock().unwrap_or_else(|e| e.into_inner());
        cancel.cancel();
        *cancel = CancelToken::new();
    }

    async fn tick(&self) {
        info!("Scheduled {JOB_NAME} run starting");
        match self.run().await {
            Ok(summary) => info!(
                "Scheduled {JOB_NAME} run finished: {} of {} channels updated",
                summary.count, summary.total
            ),
            Err(e) => error!("Scheduled {JOB_NAME} run failed: {e}"),
        }
    }

    async fn run(&self) -> Result<RunSummary> {
        let cancel = self.current_token();
        let _roster_lock = self.roster.lock().await;
        let _running = RunningFlag::raise(&self.is_running);
        cancel.check()?;

        let mut records = self.roster.load().await?;
        let total = records.len();
        if total == 0 {
            info!("Roster is empty, nothing to refresh");
            return Ok(RunSummary { count: 0, total });
        }

        let ids: Vec<String> = records.iter().map(|r| r.channel_id.clone()).collect();
        let stats = self.stages.channel_stats(&ids, &cancel).await?;
        if stats.len() < ids.len() {
            warn!(
                "Provider returned stats for {} of {} tracked channels",
                stats.len(),
                ids.len()
            );
        }

        let fetched_at = Utc::now();
        let snapshots = merge_stats(&mut records, &stats, fetched_at);
        self.roster.save(&records).await?;
        self.roster.append_history(&snapshots).await?;

        *self.last_run.lock().unwrap_or_else(|e| e.into_inner()) = Some(fetched_at);
        Ok(RunSummary {
            count: snapshots.len(),
            total,
        })
    }
}

pub struct CollectorJob {
    runner: Arc<Runner>,
    scheduler: AsyncMutex<Option<JobScheduler>>,
    jobs: AsyncMutex<HashMap<String, RegisteredJob>>,
}

impl CollectorJob {
    pub fn new(roster: Arc<ChannelRoster>, stages: StageFetchers) -> Self {
        CollectorJob {
            runner: Arc::new(Runner {
                roster,
                stages,
                is_running: AtomicBool::new(false),
                last_run: Mutex::new(None),
                cancel: Mutex::new(CancelToken::new()),
            }),
            scheduler: AsyncMutex::new(None),
            jobs: AsyncMutex::new(HashMap::new()),
        }
    }

    async fn scheduler(&self) -> Result<JobScheduler> {
        let mut scheduler = self.scheduler.lock().await;
        if let Some(existing) = scheduler.as_ref() {
            return Ok(existing.clone());
        }

        let created = JobScheduler::new()
            .await
            .map_err(|e| CollectorError::Scheduler(e.to_string()))?;
        created
            .start()
            .await
            .map_err(|e| CollectorError::Scheduler(e.to_string()))?;
        *scheduler = Some(created.clone());
        Ok(created)
    }

    /// Registers the recurring job. Fails without side effects if the job is
    /// already registered or the expression does not parse.
    pub async fn start(&self, schedule: &str) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        if let Some(existing) = jobs.get(JOB_NAME) {
            return Err(CollectorError::Configuration(format!(
                "{JOB_NAME} job is already running on '{}'",
                existing.schedule
            )));
        }

        let cron = normalize_cron(schedule)?;
        let runner = self.runner.clone();
        let job = Job::new_async(cron.as_str(), move |_uuid, _l| {
            let runner = runner.clone();
            Box::pin(async move {
                runner.tick().await;
            })
        })
        .map_err(|e| {
            CollectorError::Configuration(format!("invalid cron expression '{schedule}': {e}"))
        })?;

        let id = self
            .scheduler()
            .await?
            .add(job)
            .await
            .map_err(|e| CollectorError::Scheduler(e.to_string()))?;
        jobs.insert(
            JOB_NAME.to_string(),
            RegisteredJob {
                id,
                schedule: schedule.trim().to_string(),
            },
        );

        info!("{JOB_NAME} job started with schedule '{}'", schedule.trim());
        Ok(())
    }

    /// Removes the job and cancels any run in flight. Returns false if no job
    /// was registered.
    pub async fn stop(&self) -> Result<bool> {
        let mut jobs = self.jobs.lock().await;
        let Some(registered) = jobs.remove(JOB_NAME) else {
            return Ok(false);
        };

        self.runner.cancel_in_flight();
        if let Some(scheduler) = self.scheduler.lock().await.as_ref() {
            scheduler
                .remove(&registered.id)
                .await
                .map_err(|e| CollectorError::Scheduler(e.to_string()))?;
        }

        info!("{JOB_NAME} job stopped");
        Ok(true)
    }

    /// Same run as a cron tick, out of band.
    pub async fn run_now(&self) -> Result<RunSummary> {
        info!("Manual {JOB_NAME} run requested");
        let result = self.runner.run().await;
        if let Err(e) = &result {
            error!("Manual {JOB_NAME} run failed: {e}");
        }
        result
    }

    pub async fn status(&self) -> SchedulerStatus {
        let jobs = self.jobs.lock().await;
        let registered = jobs.get(JOB_NAME);
        SchedulerStatus {
            is_running: self.runner.is_running.load(Ordering::SeqCst),
            is_enabled: registered.is_some(),
            schedule: registered.map(|job| job.schedule.clone()),
            last_run: *self
                .runner
                .last_run
                .lock()
                .unwrap_or_else(|e| e.into_inner()),
        }
    }

    /// Shuts the underlying scheduler down, if one was started.
    pub async fn shutdown(&self) -> Result<()> {
        self.runner.cancel_in_flight();
        self.jobs.lock().await.clear();
        if let Some(mut scheduler) = self.scheduler.lock().await.take() {
            scheduler
                .shutdown()
                .await
                .map_err(|e| CollectorError::Scheduler(e.to_string()))?;
        }
        Ok(())
    }
}
