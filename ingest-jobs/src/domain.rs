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

use ingest_common::domain::{Job, JobType, WalletId};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum JobStoreError {
    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error("job {0} was not found or is not in a claimable state")]
    NotFound(Uuid),
}

/// Durable job queue. Holds no in-process state: every call is a single round trip to the
/// store, so any number of worker processes can share one `JobStore` implementation safely.
#[trait_variant::make(Send)]
pub trait JobStore
where
    Self: Clone + Send + Sync + 'static,
{
    /// Insert a new job, queued (default) or scheduled for `run_at` in the future.
    async fn enqueue(
        &self,
        org_id: Uuid,
        job_type: JobType,
        payload: serde_json::Value,
        run_at: OffsetDateTime,
    ) -> Result<Job, JobStoreError>;

    /// Atomically claim up to `limit` claimable jobs belonging to `org_id` for `worker_id`,
    /// ordered by `run_at` ascending, using `FOR UPDATE SKIP LOCKED` so no two claimers ever
    /// receive the same row.
    async fn claim(
        &self,
        org_id: Uuid,
        worker_id: &str,
        limit: i64,
        lease_secs: i64,
    ) -> Result<Vec<Job>, JobStoreError>;

    /// Mark a claimed job as succeeded. Terminal; idempotent if called twice on the same id
    /// except the second call affects zero rows.
    async fn complete(&self, id: Uuid) -> Result<(), JobStoreError>;

    /// Record a failure. Re-queues with exponential backoff unless `attempts` has reached
    /// `max_attempts`, in which case the job becomes terminally `failed`.
    async fn fail(&self, id: Uuid, error: &str) -> Result<(), JobStoreError>;

    /// One-shot recovery of `running` jobs whose lease has expired, back to `queued`. Run at
    /// worker startup; normal operation relies on `claim`'s own expiry predicate.
    async fn recover_stuck(&self) -> Result<u64, JobStoreError>;

    /// Whether an `ingest_wallet` job for `wallet_id` is already `queued` or `running`, used by
    /// the scheduler to avoid enqueuing duplicate fetch work for the same wallet.
    async fn has_pending_ingest_wallet_job(
        &self,
        org_id: Uuid,
        wallet_id: WalletId,
    ) -> Result<bool, JobStoreError>;

    /// Cancels every still-`queued` `ingest_wallet` job for `wallet_id`, returning the number of
    /// rows affected. Used when a wallet is unregistered so stale fetch work is never claimed
    /// for it; a subsequent re-registration starts from a fresh cursor and backfills in full.
    async fn cancel_wallet_jobs(&self, org_id: Uuid, wallet_id: WalletId) -> Result<u64, JobStoreError>;

    /// Counts of jobs by status, plus the count of `running` jobs whose lease has already
    /// expired. Backs the admin `monitor` operation.
    async fn status_counts(&self) -> Result<StatusCounts, JobStoreError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub queued: i64,
    pub running: i64,
    pub succeeded: i64,
    pub failed: i64,
    pub canceled: i64,
    pub expired_leases: i64,
}

/// `run_at = now + 2^attempts` seconds, capped so a single failing job never schedules itself
/// arbitrarily far into the future.
pub fn backoff_delay(attempts: i32) -> time::Duration {
    let capped = attempts.clamp(0, 20);
    time::Duration::seconds(2i64.saturating_pow(capped as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially() {
        assert_eq!(backoff_delay(0), time::Duration::seconds(1));
        assert_eq!(backoff_delay(1), time::Duration::seconds(2));
        assert_eq!(backoff_delay(3), time::Duration::seconds(8));
    }

    #[test]
    fn backoff_does_not_overflow_for_large_attempts() {
        let delay = backoff_delay(100);
        assert_eq!(delay, time::Duration::seconds(1 << 20));
    }
}
