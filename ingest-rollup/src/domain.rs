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

use ingest_common::domain::{JobPayload, JobType, WalletId};
use ingest_jobs::{JobStore, JobStoreError};
use thiserror::Error;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RollupError {
    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    JobStore(#[from] JobStoreError),

    #[error("failed to encode job payload")]
    Encode(#[from] serde_json::Error),
}

/// Access to the raw-fill, wallet-day and global-day tables needed to recompute derived
/// aggregates. Every operation here is a pure function of its inputs: running it twice with the
/// same raw data produces byte-identical rows modulo `updated_at`.
#[trait_variant::make(Send)]
pub trait RollupStorage
where
    Self: Clone + Send + Sync + 'static,
{
    /// Recompute `wallet_day_metrics` for `(org_id, wallet_id, day)` from raw fills and UPSERT.
    async fn rollup_wallet_day(&self, org_id: Uuid, wallet_id: WalletId, day: Date) -> Result<(), sqlx::Error>;

    /// Recompute `global_day_metrics` for `(org_id, day)` from wallet-day metrics and UPSERT.
    async fn rollup_global_day(&self, org_id: Uuid, day: Date) -> Result<(), sqlx::Error>;

    async fn delete_wallet_day_range(
        &self,
        org_id: Uuid,
        wallet_id: Option<WalletId>,
        from_day: Date,
        to_day: Date,
    ) -> Result<(), sqlx::Error>;

    async fn delete_global_day_range(&self, org_id: Uuid, from_day: Date, to_day: Date) -> Result<(), sqlx::Error>;

    /// Wallets with at least one raw fill in `[from_day, to_day]`, used to re-enqueue
    /// `rollup_wallet_day` for every affected wallet when a rebuild doesn't name one.
    async fn distinct_wallets_in_range(&self, org_id: Uuid, from_day: Date, to_day: Date) -> Result<Vec<WalletId>, sqlx::Error>;
}

/// Inclusive list of dates from `from_day` to `to_day`.
pub fn day_range(from_day: Date, to_day: Date) -> Vec<Date> {
    let mut days = Vec::new();
    let mut current = from_day;

    while current <= to_day {
        days.push(current);
        match current.next_day() {
            Some(next) => current = next,
            None => break,
        }
    }

    days
}

/// Runs the `rollup_wallet_day` job: recomputes the named days, then chains
/// `rollup_global_day` for the same `(org_id, days)`.
pub async fn run_rollup_wallet_day<St, J>(
    storage: &St,
    job_store: &J,
    org_id: Uuid,
    wallet_id: WalletId,
    days: &[Date],
) -> Result<(), RollupError>
where
    St: RollupStorage,
    J: JobStore,
{
    for day in days {
        storage.rollup_wallet_day(org_id, wallet_id, *day).await?;
    }

    let payload = serde_json::to_value(JobPayload::RollupGlobalDay {
        org_id,
        days: days.to_vec(),
    })?;

    job_store
        .enqueue(org_id, JobType::RollupGlobalDay, payload, OffsetDateTime::now_utc())
        .await?;

    Ok(())
}

/// Runs the `rollup_global_day` job: recomputes the named days from wallet-day metrics.
pub async fn run_rollup_global_day<St>(storage: &St, org_id: Uuid, days: &[Date]) -> Result<(), RollupError>
where
    St: RollupStorage,
{
    for day in days {
        storage.rollup_global_day(org_id, *day).await?;
    }

    Ok(())
}

/// Admin rebuild: deletes derived rows in `[from_day, to_day]` and re-enqueues the
/// `rollup_wallet_day`/`rollup_global_day` jobs that regenerate them.
pub async fn rebuild_range<St, J>(
    storage: &St,
    job_store: &J,
    org_id: Uuid,
    wallet_id: Option<WalletId>,
    from_day: Date,
    to_day: Date,
) -> Result<(), RollupError>
where
    St: RollupStorage,
    J: JobStore,
{
    storage
        .delete_wallet_day_range(org_id, wallet_id, from_day, to_day)
        .await?;
    storage.delete_global_day_range(org_id, from_day, to_day).await?;

    let days = day_range(from_day, to_day);
    let now = OffsetDateTime::now_utc();

    let wallets = match wallet_id {
        Some(wallet_id) => vec![wallet_id],
        None => storage.distinct_wallets_in_range(org_id, from_day, to_day).await?,
    };

    for wallet_id in wallets {
        let payload = serde_json::to_value(JobPayload::RollupWalletDay {
            org_id,
            wallet_id,
            days: days.clone(),
        })?;

        job_store.enqueue(org_id, JobType::RollupWalletDay, payload, now).await?;
    }

    Ok(())
}
