//! Background materialization.
//!
//! A [`MaterializationWorker`] repeatedly picks the organizations that are due,
//! claims each one's window through its lease, expands every active rule of the
//! organization in one transaction and periodically prunes history. It never
//! reads the wall clock inside [`MaterializationWorker::tick`], so ticks can be
//! driven with fixed timestamps.

use crate::error::CoreError;
use crate::models::{OrganizationRun, WindowConfig};
use crate::repository::{MaterializationRepository, WindowRepository};
use chrono::{DateTime, SubsecRound, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

const DEFAULT_TICK_SECS: u64 = 60;
const DEFAULT_LEASE_SECS: i64 = 300;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Written into `lease_owner` while a window is claimed
    pub worker_id: String,
    pub tick_interval: Duration,
    pub max_organizations_per_tick: usize,
    pub lease_ttl: chrono::Duration,
    /// Prune after every n-th tick; 0 disables pruning
    pub prune_every_ticks: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("cadence-worker-{}", std::process::id()),
            tick_interval: Duration::from_secs(DEFAULT_TICK_SECS),
            max_organizations_per_tick: 50,
            lease_ttl: chrono::Duration::seconds(DEFAULT_LEASE_SECS),
            prune_every_ticks: 60,
        }
    }
}

impl WorkerConfig {
    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterializationSummary {
    pub organizations_processed: usize,
    /// Claimed by someone else or changed since selection
    pub organizations_skipped: usize,
    pub organizations_failed: usize,
    pub instances_created: u64,
    pub instances_pruned: u64,
    pub errors: Vec<String>,
    pub duration_ms: u128,
}

pub struct MaterializationWorker<R> {
    repository: Arc<R>,
    config: WorkerConfig,
}

impl<R> MaterializationWorker<R>
where
    R: MaterializationRepository + WindowRepository + Send + Sync,
{
    pub fn new(repository: Arc<R>, config: WorkerConfig) -> Self {
        Self { repository, config }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Processes up to `max_organizations_per_tick` due organizations.
    ///
    /// A failing organization is counted and logged; it does not stop the
    /// tick. Only the initial selection query can fail the whole tick.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<MaterializationSummary, CoreError> {
        let started = Instant::now();
        let due = self
            .repository
            .find_due_windows(self.config.max_organizations_per_tick, now)
            .await?;

        let mut summary = MaterializationSummary::default();
        for window in &due {
            match self.process_organization(window, now).await {
                Ok(Some(run)) => {
                    summary.organizations_processed += 1;
                    summary.instances_created += run.instances_created;
                }
                Ok(None) => summary.organizations_skipped += 1,
                Err(err) => {
                    summary.organizations_failed += 1;
                    summary
                        .errors
                        .push(format!("{}: {}", window.organization_id, err.full_message()));
                }
            }
        }
        summary.duration_ms = started.elapsed().as_millis();

        tracing::info!(
            due = due.len(),
            processed = summary.organizations_processed,
            skipped = summary.organizations_skipped,
            failed = summary.organizations_failed,
            created = summary.instances_created,
            duration_ms = summary.duration_ms as u64,
            "materialization tick finished"
        );
        Ok(summary)
    }

    /// Claims, expands and commits one organization.
    ///
    /// Returns `Ok(None)` when the window could not be claimed or changed
    /// underneath the worker. On failure the lease is released so the next
    /// tick retries, and `last_processed_at` keeps its old value.
    #[tracing::instrument(
        skip(self, window),
        fields(organization_id = %window.organization_id, worker_id = %self.config.worker_id)
    )]
    pub async fn process_organization(
        &self,
        window: &WindowConfig,
        now: DateTime<Utc>,
    ) -> Result<Option<OrganizationRun>, CoreError> {
        let worker_id = self.config.worker_id.as_str();
        let Some(claimed) = self
            .repository
            .claim_window(window, worker_id, self.config.lease_ttl, now)
            .await?
        else {
            tracing::debug!("window already claimed, skipping");
            return Ok(None);
        };

        match self
            .repository
            .materialize_window(&claimed, worker_id, now)
            .await
        {
            Ok(run) => {
                tracing::info!(
                    rules = run.rules_processed,
                    created = run.instances_created,
                    window_end = %run.window_end,
                    truncated = run.truncated,
                    "organization materialized"
                );
                Ok(Some(run))
            }
            Err(err) => {
                if let Err(release_err) = self
                    .repository
                    .release_window(window.organization_id, worker_id)
                    .await
                {
                    tracing::warn!(error = %release_err.full_message(), "failed to release lease");
                }
                if let CoreError::Conflict(message) = &err {
                    tracing::debug!(%message, "window changed during processing, skipping");
                    return Ok(None);
                }
                if err.is_transient() {
                    tracing::warn!(error = %err.full_message(), "transient failure, retrying next tick");
                } else {
                    tracing::error!(error = %err.full_message(), "materialization failed");
                }
                Err(err)
            }
        }
    }

    /// Prunes the history of every enabled organization. Returns the number of
    /// instances removed; failures are logged and skipped.
    pub async fn prune(&self, now: DateTime<Utc>) -> Result<u64, CoreError> {
        let windows = self.repository.find_enabled_windows().await?;
        let mut deleted = 0;
        for window in windows {
            match self
                .repository
                .prune_window(window.organization_id, now)
                .await
            {
                Ok(outcome) => {
                    if outcome.instances_deleted > 0 {
                        tracing::info!(
                            organization_id = %outcome.organization_id,
                            deleted = outcome.instances_deleted,
                            retention_start = %outcome.retention_start_date,
                            "pruned history"
                        );
                    }
                    deleted += outcome.instances_deleted;
                }
                Err(err) => tracing::warn!(
                    organization_id = %window.organization_id,
                    error = %err.full_message(),
                    "prune failed"
                ),
            }
        }
        Ok(deleted)
    }

    /// One tick followed by a prune, the unit of work of a single scheduled run.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<MaterializationSummary, CoreError> {
        let mut summary = self.tick(now).await?;
        summary.instances_pruned = self.prune(now).await?;
        Ok(summary)
    }

    /// Ticks until `cancel` fires. Every tick runs to completion; cancellation
    /// is only observed between ticks.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            worker_id = %self.config.worker_id,
            interval_secs = self.config.tick_interval.as_secs(),
            "materialization worker starting"
        );
        let mut ticks: u64 = 0;
        while !cancel.is_cancelled() {
            let now = Utc::now().trunc_subsecs(0);
            ticks += 1;
            if let Err(err) = self.tick(now).await {
                tracing::warn!(error = %err.full_message(), "materialization tick failed");
            }

            let prune_every = u64::from(self.config.prune_every_ticks);
            if prune_every > 0 && ticks % prune_every == 0 {
                if let Err(err) = self.prune(now).await {
                    tracing::warn!(error = %err.full_message(), "prune pass failed");
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(self.config.tick_interval) => {}
            }
        }
        tracing::info!(ticks, "materialization worker stopped");
    }
}
