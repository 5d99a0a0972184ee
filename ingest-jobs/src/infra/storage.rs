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
    domain::{Job, JobType, WalletId},
    infra::pool::postgres::PostgresPool,
};
use log::{debug, info};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::{backoff_delay, JobStore, JobStoreError, StatusCounts};

/// Postgres-backed job queue. Every operation is a single statement or a short transaction;
/// there is nothing to recover on process restart beyond what `recover_stuck` already handles.
#[derive(Debug, Clone)]
pub struct PostgresJobStore {
    pool: PostgresPool,
    default_max_attempts: i32,
}

impl PostgresJobStore {
    pub fn new(pool: PostgresPool) -> Self {
        Self::with_max_attempts(pool, ingest_common::domain::DEFAULT_MAX_ATTEMPTS)
    }

    pub fn with_max_attempts(pool: PostgresPool, default_max_attempts: i32) -> Self {
        Self {
            pool,
            default_max_attempts,
        }
    }
}

impl JobStore for PostgresJobStore {
    #[trace]
    async fn enqueue(
        &self,
        org_id: Uuid,
        job_type: JobType,
        payload: serde_json::Value,
        run_at: OffsetDateTime,
    ) -> Result<Job, JobStoreError> {
        let job = sqlx::query_as::<_, Job>(
            "insert into jobs (org_id, job_type, payload, run_at, max_attempts) values ($1, $2, $3, $4, $5) \
             returning id, org_id, job_type, payload, run_at, status, attempts, max_attempts, \
             locked_by, locked_at, lock_expires_at, last_error",
        )
        .bind(org_id)
        .bind(job_type)
        .bind(payload)
        .bind(run_at)
        .bind(self.default_max_attempts)
        .fetch_one(&*self.pool)
        .await?;

        debug!(job_id:? = job.id, job_type:?; "enqueued job");
        Ok(job)
    }

    #[trace]
    async fn claim(
        &self,
        org_id: Uuid,
        worker_id: &str,
        limit: i64,
        lease_secs: i64,
    ) -> Result<Vec<Job>, JobStoreError> {
        let now = OffsetDateTime::now_utc();
        let lease_expires = now + time::Duration::seconds(lease_secs);

        let jobs = sqlx::query_as::<_, Job>(
            "with claimable as ( \
                 select id from jobs \
                 where org_id = $5 and run_at <= $1 \
                   and (status = 'queued' or (status = 'running' and lock_expires_at < $1)) \
                 order by run_at asc \
                 limit $2 \
                 for update skip locked \
             ) \
             update jobs set status = 'running', locked_by = $3, locked_at = $1, \
                 lock_expires_at = $4, attempts = attempts + 1 \
             from claimable where jobs.id = claimable.id \
             returning jobs.id, jobs.org_id, jobs.job_type, jobs.payload, jobs.run_at, \
                 jobs.status, jobs.attempts, jobs.max_attempts, jobs.locked_by, jobs.locked_at, \
                 jobs.lock_expires_at, jobs.last_error",
        )
        .bind(now)
        .bind(limit)
        .bind(worker_id)
        .bind(lease_expires)
        .bind(org_id)
        .fetch_all(&*self.pool)
        .await?;

        if !jobs.is_empty() {
            debug!(count = jobs.len(), worker_id; "claimed jobs");
        }

        Ok(jobs)
    }

    async fn complete(&self, id: Uuid) -> Result<(), JobStoreError> {
        sqlx::query("update jobs set status = 'succeeded' where id = $1")
            .bind(id)
            .execute(&*self.pool)
            .await?;

        Ok(())
    }

    #[trace]
    async fn fail(&self, id: Uuid, error: &str) -> Result<(), JobStoreError> {
        let row: Option<(i32, i32)> =
            sqlx::query_as("select attempts, max_attempts from jobs where id = $1")
                .bind(id)
                .fetch_optional(&*self.pool)
                .await?;

        let Some((attempts, max_attempts)) = row else {
            return Err(JobStoreError::NotFound(id));
        };

        if attempts >= max_attempts {
            sqlx::query("update jobs set status = 'failed', last_error = $2 where id = $1")
                .bind(id)
                .bind(error)
                .execute(&*self.pool)
                .await?;

            info!(job_id:? = id, attempts; "job exhausted retries, marking failed");
        } else {
            let run_at = OffsetDateTime::now_utc() + backoff_delay(attempts);

            sqlx::query(
                "update jobs set status = 'queued', run_at = $2, last_error = $3, \
                 locked_by = null, locked_at = null, lock_expires_at = null where id = $1",
            )
            .bind(id)
            .bind(run_at)
            .bind(error)
            .execute(&*self.pool)
            .await?;

            debug!(job_id:? = id, attempts, run_at:?; "job re-queued with backoff");
        }

        Ok(())
    }

    async fn recover_stuck(&self) -> Result<u64, JobStoreError> {
        let now = OffsetDateTime::now_utc();

        let result = sqlx::query(
            "update jobs set status = 'queued' \
             where status = 'running' and lock_expires_at < $1",
        )
        .bind(now)
        .execute(&*self.pool)
        .await?;

        let recovered = result.rows_affected();
        if recovered > 0 {
            info!(recovered; "recovered stuck jobs with expired leases");
        }

        Ok(recovered)
    }

    async fn has_pending_ingest_wallet_job(
        &self,
        org_id: Uuid,
        wallet_id: WalletId,
    ) -> Result<bool, JobStoreError> {
        let exists: Option<bool> = sqlx::query_scalar(
            "select exists ( \
                 select 1 from jobs \
                 where org_id = $1 and job_type = 'ingest_wallet' \
                   and status in ('queued', 'running') \
                   and (payload ->> 'wallet_id')::bigint = $2 \
             )",
        )
        .bind(org_id)
        .bind(wallet_id)
        .fetch_one(&*self.pool)
        .await?;

        Ok(exists.unwrap_or(false))
    }

    async fn cancel_wallet_jobs(&self, org_id: Uuid, wallet_id: WalletId) -> Result<u64, JobStoreError> {
        let result = sqlx::query(
            "update jobs set status = 'canceled' \
             where org_id = $1 and job_type = 'ingest_wallet' and status = 'queued' \
               and (payload ->> 'wallet_id')::bigint = $2",
        )
        .bind(org_id)
        .bind(wallet_id)
        .execute(&*self.pool)
        .await?;

        let canceled = result.rows_affected();
        if canceled > 0 {
            info!(org_id:?, wallet_id, canceled; "canceled pending ingest_wallet jobs");
        }

        Ok(canceled)
    }

    async fn status_counts(&self) -> Result<StatusCounts, JobStoreError> {
        let now = OffsetDateTime::now_utc();

        let row: (i64, i64, i64, i64, i64, i64) = sqlx::query_as(
            "select \
                 count(*) filter (where status = 'queued'), \
                 count(*) filter (where status = 'running'), \
                 count(*) filter (where status = 'succeeded'), \
                 count(*) filter (where status = 'failed'), \
                 count(*) filter (where status = 'canceled'), \
                 count(*) filter (where status = 'running' and lock_expires_at < $1) \
             from jobs",
        )
        .bind(now)
        .fetch_one(&*self.pool)
        .await?;

        Ok(StatusCounts {
            queued: row.0,
            running: row.1,
            succeeded: row.2,
            failed: row.3,
            canceled: row.4,
            expired_leases: row.5,
        })
    }
}
