// This file is part of hl-ingest.
// SPDX-License-Identifier: Apache-2.0
// Licensed under the Apache License, Version 2.0 (the "License");
// You may not use this file except in compliance with the License.
// You may obtain a copy of the License at
// http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::Context;
use futures::stream::{self, StreamExt, TryStreamExt};
use ingest_common::domain::Job;
use ingest_jobs::{JobStore, PostgresJobStore};
use ingest_scheduler::Scheduler;
use log::{info, warn};
use uuid::Uuid;

use crate::config::{SchedulerSettings, WorkerSettings};
use crate::handlers::Handlers;

/// Runs the claim-and-dispatch loop and the scheduler tick concurrently until `SIGTERM`/`SIGINT`.
pub async fn run(
    handlers: Handlers,
    job_store: PostgresJobStore,
    org_id: Uuid,
    lease_secs: i64,
    worker: WorkerSettings,
    scheduler_settings: SchedulerSettings,
) -> anyhow::Result<()> {
    let recovered = job_store.recover_stuck().await.context("recovering stuck jobs on startup")?;
    if recovered > 0 {
        info!(recovered; "recovered stuck jobs on startup");
    }

    let worker_id = worker.resolved_id();
    let concurrency_limit = worker.resolved_concurrency_limit();

    let handlers = Arc::new(handlers);
    let claim_loop = claim_loop(handlers.clone(), org_id, worker_id, concurrency_limit, lease_secs);
    let tick_loop = scheduler_tick_loop(handlers.clone(), org_id, scheduler_settings.tick_interval);

    tokio::select! {
        result = claim_loop => result.context("claim loop exited"),
        result = tick_loop => result.context("scheduler tick loop exited"),
        _ = shutdown_signal() => {
            info!("received shutdown signal, stopping");
            Ok(())
        }
    }
}

async fn claim_loop(
    handlers: Arc<Handlers>,
    org_id: Uuid,
    worker_id: String,
    concurrency_limit: usize,
    lease_secs: i64,
) -> anyhow::Result<()> {
    loop {
        let jobs = handlers
            .job_store
            .claim(org_id, &worker_id, concurrency_limit as i64, lease_secs)
            .await
            .context("claiming jobs")?;

        if jobs.is_empty() {
            tokio::time::sleep(StdDuration::from_millis(500)).await;
            continue;
        }

        dispatch_batch(&handlers, jobs, concurrency_limit).await?;
    }
}

async fn dispatch_batch(handlers: &Arc<Handlers>, jobs: Vec<Job>, concurrency_limit: usize) -> anyhow::Result<()> {
    stream::iter(jobs.into_iter().map(Ok::<_, anyhow::Error>))
        .try_for_each_concurrent(Some(concurrency_limit), |job| {
            let handlers = handlers.clone();
            async move {
                match handlers.dispatch(&job).await {
                    Ok(()) => handlers
                        .job_store
                        .complete(job.id)
                        .await
                        .context("marking job complete"),
                    Err(error) => {
                        warn!(job_id:? = job.id, error:%; "job handler failed");
                        handlers
                            .job_store
                            .fail(job.id, &format!("{error:#}"))
                            .await
                            .context("marking job failed")
                    }
                }
            }
        })
        .await
}

async fn scheduler_tick_loop(handlers: Arc<Handlers>, org_id: Uuid, tick_interval: StdDuration) -> anyhow::Result<()> {
    let mut interval = tokio::time::interval(tick_interval);

    loop {
        interval.tick().await;

        match handlers.scheduler.tick(org_id).await {
            Ok(report) => {
                if report.scheduled > 0 || report.skipped > 0 {
                    info!(scheduled = report.scheduled, skipped = report.skipped; "scheduler tick");
                }
            }
            Err(error) => warn!(error:%; "scheduler tick failed, retrying next interval"),
        }
    }
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let ctrl_c = tokio::signal::ctrl_c();

    tokio::select! {
        _ = sigterm.recv() => {},
        _ = ctrl_c => {},
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
