//! The maintenance scheduler (spec §4.8): "a small cron-like scheduler holds
//! named jobs `{id, schedule, command, enabled, lastRun, lastStatus,
//! nextRun}`. On each tick, jobs whose `nextRun ≤ now` are dispatched to a
//! single-threaded executor (no parallel cron execution within a host)."
//!
//! Schedules use cron's `@hourly`/`@daily`/`@weekly` descriptors rather than
//! full five-field cron syntax — the spec names no wire format, and the
//! descriptor form covers every job this engine actually runs.

use std::collections::HashSet;
use std::future::Future;

/// Result of one job's most recent execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// The job's executor returned `Ok`.
    Success,
    /// The job's executor returned `Err`; see the job's `last_error`.
    Error,
}

fn interval_secs(schedule: &str) -> Option<i64> {
    match schedule {
        "@hourly" => Some(3_600),
        "@daily" => Some(86_400),
        "@weekly" => Some(604_800),
        _ => None,
    }
}

/// A named, schedulable maintenance job.
#[derive(Debug, Clone)]
pub struct Job {
    /// Stable identifier, e.g. `"prune"`, `"reflect"`.
    pub id: String,
    /// A cron descriptor (`@hourly`, `@daily`, `@weekly`).
    pub schedule: String,
    /// Opaque command name the executor dispatches on.
    pub command: String,
    /// Disabled jobs are never dispatched.
    pub enabled: bool,
    /// Timestamp of the last dispatch, if any.
    pub last_run: Option<i64>,
    /// Outcome of the last dispatch, if any.
    pub last_status: Option<JobStatus>,
    /// Error message from the last dispatch, if it failed.
    pub last_error: Option<String>,
    /// Earliest timestamp at which this job may next dispatch.
    pub next_run: i64,
}

impl Job {
    /// Builds a new, never-yet-run, enabled job with its first `next_run`
    /// computed from `schedule` relative to `now`. An unrecognized schedule
    /// descriptor is accepted but never dispatches (`next_run` is pinned to
    /// `i64::MAX`).
    #[must_use]
    pub fn new(id: impl Into<String>, schedule: impl Into<String>, command: impl Into<String>, now: i64) -> Self {
        let schedule = schedule.into();
        let next_run = interval_secs(&schedule).map_or(i64::MAX, |secs| now + secs);
        Self {
            id: id.into(),
            schedule,
            command: command.into(),
            enabled: true,
            last_run: None,
            last_status: None,
            last_error: None,
            next_run,
        }
    }
}

/// Holds the maintenance job set and drives ticks against it.
#[derive(Debug, Default)]
pub struct Scheduler {
    jobs: Vec<Job>,
}

impl Scheduler {
    /// An empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All jobs, in insertion order.
    #[must_use]
    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    /// Looks up a job by id.
    #[must_use]
    pub fn job(&self, id: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }

    /// Registers a job, replacing any existing job sharing its id.
    pub fn add_job(&mut self, job: Job) {
        self.jobs.retain(|j| j.id != job.id);
        self.jobs.push(job);
    }

    /// Explicit user toggle. Returns `false` if no job with `id` exists.
    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> bool {
        match self.jobs.iter_mut().find(|j| j.id == id) {
            Some(job) => {
                job.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Adds any job from `defaults` whose id is not already present. Never
    /// touches `enabled` on an existing job — `verify --fix` "may add missing
    /// jobs but must never re-enable user-disabled jobs."
    pub fn seed_missing(&mut self, defaults: Vec<Job>) -> Vec<String> {
        let existing: HashSet<&str> = self.jobs.iter().map(|j| j.id.as_str()).collect();
        let mut added = Vec::new();
        for job in defaults {
            if !existing.contains(job.id.as_str()) {
                added.push(job.id.clone());
                self.jobs.push(job);
            }
        }
        added
    }

    /// Dispatches every enabled job whose `next_run <= now` to `executor`,
    /// sequentially — "no parallel cron execution within a host." Updates
    /// `last_run`/`last_status`/`last_error`/`next_run` from each result.
    pub async fn tick<F, Fut>(&mut self, now: i64, mut executor: F)
    where
        F: FnMut(&Job) -> Fut,
        Fut: Future<Output = std::result::Result<(), String>>,
    {
        for job in &mut self.jobs {
            if !job.enabled || job.next_run > now {
                continue;
            }
            let result = executor(job).await;
            job.last_run = Some(now);
            match result {
                Ok(()) => {
                    job.last_status = Some(JobStatus::Success);
                    job.last_error = None;
                }
                Err(message) => {
                    job.last_status = Some(JobStatus::Error);
                    job.last_error = Some(message);
                }
            }
            job.next_run = interval_secs(&job.schedule).map_or(i64::MAX, |secs| now + secs);
        }
    }
}
