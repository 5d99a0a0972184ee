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

mod app;
mod cli;
mod config;
mod governor;
mod handlers;

use anyhow::Context;
use clap::Parser;
use ingest_fetcher::{HttpUpstream, PostgresFetcherStorage};
use ingest_governor::{LocalGovernor, PostgresGovernor};
use ingest_jobs::{JobStore, PostgresJobStore};
use ingest_rollup::PostgresRollupStorage;
use ingest_scheduler::PostgresScheduler;
use log::info;

use crate::cli::{Cli, Command};
use crate::governor::AnyGovernor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config: config::Config = config::load(cli.config.as_deref()).context("loading config")?;

    ingest_common::logging::init(&config.logging);

    let pool = ingest_common::infra::pool::postgres::PostgresPool::connect(&config.database)
        .await
        .context("connecting to database")?;

    ingest_common::infra::migrations::postgres::run(&pool)
        .await
        .context("running database migrations")?;

    let governor_config = config.governor.as_governor_config();
    let governor = if config.governor.use_distributed {
        AnyGovernor::Distributed(PostgresGovernor::new(pool.clone(), governor_config))
    } else {
        AnyGovernor::Local(LocalGovernor::new(governor_config))
    };

    let job_store =
        PostgresJobStore::with_max_attempts(pool.clone(), config.job_store.default_max_attempts);
    let scheduler = PostgresScheduler::new(
        pool.clone(),
        governor.clone(),
        job_store.clone(),
        config.scheduler.max_jobs_per_run,
    );
    let fetcher_storage = PostgresFetcherStorage::new(pool.clone());
    let rollup_storage = PostgresRollupStorage::new(pool.clone());
    let upstream = HttpUpstream::with_timeout(
        config.fetcher.upstream_base_url.clone(),
        config.fetcher.upstream_timeout,
    )
    .context("building upstream HTTP client")?;

    let overlap = time::Duration::try_from(config.fetcher.overlap_window)
        .unwrap_or(ingest_fetcher::domain::OVERLAP_WINDOW);

    let handlers = handlers::Handlers {
        governor,
        job_store: job_store.clone(),
        scheduler,
        fetcher_storage,
        rollup_storage,
        upstream,
        overlap,
    };

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            app::run(
                handlers,
                job_store,
                config.org_id,
                config.job_store.default_lease_secs,
                config.worker,
                config.scheduler,
            )
            .await
        }
        Command::Monitor => {
            let counts = job_store.status_counts().await.context("fetching job status counts")?;
            info!(
                queued = counts.queued,
                running = counts.running,
                succeeded = counts.succeeded,
                failed = counts.failed,
                canceled = counts.canceled,
                expired_leases = counts.expired_leases;
                "job store status"
            );
            Ok(())
        }
        Command::Recover => {
            let recovered = job_store.recover_stuck().await.context("recovering stuck jobs")?;
            info!(recovered; "recovered stuck jobs");
            Ok(())
        }
        Command::UnregisterWallet { wallet_id } => {
            sqlx::query("delete from org_wallets where org_id = $1 and wallet_id = $2")
                .bind(config.org_id)
                .bind(wallet_id)
                .execute(&*pool)
                .await
                .context("unlinking wallet from org")?;

            let canceled = job_store
                .cancel_wallet_jobs(config.org_id, wallet_id)
                .await
                .context("canceling pending ingest jobs for wallet")?;
            info!(wallet_id, canceled; "unregistered wallet");
            Ok(())
        }
    }
}
