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

use fastrace::trace;
use ingest_common::{
    domain::{JobPayload, JobType, SchedulableWallet, WalletId},
    infra::pool::postgres::PostgresPool,
};
use ingest_governor::Governor;
use ingest_jobs::JobStore;
use log::{debug, info};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::{
    failure_next_run_at, success_next_run_at, FetchOutcome, Scheduler, SchedulerError, TickReport,
    WalletClass,
};

/// Scheduler wired to Postgres for cursor/wallet reads and to a shared `Governor`/`JobStore` for
/// admission control and enqueueing.
#[derive(Clone)]
pub struct PostgresScheduler<G, J> {
    pool: PostgresPool,
    governor: G,
    job_store: J,
    max_jobs_per_run: i64,
}

impl<G, J> PostgresScheduler<G, J> {
    pub fn new(pool: PostgresPool, governor: G, job_store: J, max_jobs_per_run: i64) -> Self {
        Self {
            pool,
            governor,
            job_store,
            max_jobs_per_run,
        }
    }
}

impl<G, J> Scheduler for PostgresScheduler<G, J>
where
    G: Governor,
    J: JobStore,
{
    #[trace]
    async fn tick(&self, org_id: Uuid) -> Result<TickReport, SchedulerError> {
        let cap = self
            .governor
            .available_requests(self.governor.config().default_cost)
            .await?;

        if cap == 0 {
            debug!("scheduler tick: no governor capacity, skipping");
            return Ok(TickReport::default());
        }

        let now = OffsetDateTime::now_utc();

        // Pull every overdue candidate, not just the first `max_jobs_per_run` by `next_run_at`:
        // class ordering below must decide who gets pulled, so the SQL cap stays far above
        // `max_jobs_per_run` and only bounds runaway backlogs from loading unbounded rows.
        let candidate_pool_limit = (self.max_jobs_per_run * 100).max(10_000);

        let candidates: Vec<SchedulableWallet> = sqlx::query_as(
            "select ow.org_id, c.wallet_id, w.address, \
                 (select max(m.last_trade_ts) from wallet_day_metrics m \
                  where m.org_id = c.org_id and m.wallet_id = c.wallet_id) as last_trade_ts, \
                 c.next_run_at \
             from hl_ingest_cursor c \
             join org_wallets ow on ow.org_id = c.org_id and ow.wallet_id = c.wallet_id \
             join wallets w on w.wallet_id = c.wallet_id \
             where c.org_id = $1 and w.is_active and c.next_run_at <= $2 \
             order by c.next_run_at asc \
             limit $3",
        )
        .bind(org_id)
        .bind(now)
        .bind(candidate_pool_limit)
        .fetch_all(&*self.pool)
        .await?;

        let mut ranked: Vec<_> = candidates
            .into_iter()
            .map(|wallet| (WalletClass::classify(wallet.last_trade_ts, now), wallet))
            .collect();
        ranked.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.next_run_at.cmp(&b.1.next_run_at)));
        ranked.truncate(self.max_jobs_per_run as usize);

        let mut scheduled = 0u64;
        let mut skipped = 0u64;

        for (_, wallet) in ranked {
            if scheduled >= cap {
                break;
            }

            if self
                .job_store
                .has_pending_ingest_wallet_job(org_id, wallet.wallet_id)
                .await?
            {
                skipped += 1;
                continue;
            }

            let payload = serde_json::to_value(JobPayload::IngestWallet {
                org_id,
                wallet_id: wallet.wallet_id,
                address: wallet.address,
            })?;

            self.job_store
                .enqueue(org_id, JobType::IngestWallet, payload, now)
                .await?;

            scheduled += 1;
        }

        info!(scheduled, skipped; "scheduler tick complete");
        Ok(TickReport { scheduled, skipped })
    }

    async fn update_cursor(
        &self,
        org_id: Uuid,
        wallet_id: WalletId,
        outcome: FetchOutcome,
    ) -> Result<(), SchedulerError> {
        let now = OffsetDateTime::now_utc();

        match outcome {
            FetchOutcome::Success { new_cursor_ts } => {
                let last_trade_ts: Option<OffsetDateTime> = sqlx::query_scalar(
                    "select max(last_trade_ts) from wallet_day_metrics \
                     where org_id = $1 and wallet_id = $2",
                )
                .bind(org_id)
                .bind(wallet_id)
                .fetch_one(&*self.pool)
                .await?;

                let class = WalletClass::classify(last_trade_ts, now);
                let next_run_at = success_next_run_at(now, class);

                sqlx::query(
                    "update hl_ingest_cursor set error_count = 0, status = 'ok', \
                     cursor_ts = $3, last_success_at = $4, next_run_at = $5 \
                     where org_id = $1 and wallet_id = $2",
                )
                .bind(org_id)
                .bind(wallet_id)
                .bind(new_cursor_ts)
                .bind(now)
                .bind(next_run_at)
                .execute(&*self.pool)
                .await?;
            }
            FetchOutcome::Failure => {
                let (error_count,): (i32,) = sqlx::query_as(
                    "select error_count from hl_ingest_cursor where org_id = $1 and wallet_id = $2",
                )
                .bind(org_id)
                .bind(wallet_id)
                .fetch_one(&*self.pool)
                .await?;

                let new_error_count = error_count + 1;
                let next_run_at = failure_next_run_at(now, new_error_count);

                sqlx::query(
                    "update hl_ingest_cursor set error_count = $3, status = 'error', \
                     next_run_at = $4 where org_id = $1 and wallet_id = $2",
                )
                .bind(org_id)
                .bind(wallet_id)
                .bind(new_error_count)
                .bind(next_run_at)
                .execute(&*self.pool)
                .await?;
            }
        }

        Ok(())
    }
}
