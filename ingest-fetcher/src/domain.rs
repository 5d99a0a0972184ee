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

use std::collections::BTreeSet;

use ingest_common::domain::{
    CoinClassifier, Fill, FillId, HeuristicCoinClassifier, JobPayload, JobType, Side, WalletAddress,
    WalletId,
};
use ingest_governor::{Governor, GovernorError};
use ingest_jobs::{JobStore, JobStoreError};
use ingest_scheduler::{FetchOutcome, Scheduler, SchedulerError};
use log::{info, warn};
use rust_decimal::Decimal;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Compensates for upstream late arrivals: safe because inserts are idempotent on
/// `(org, wallet, fill_id, ts)`.
pub const OVERLAP_WINDOW: Duration = Duration::minutes(10);

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream rate-limited the request")]
    RateLimited,

    #[error("transient upstream failure: {0}")]
    Transient(String),

    #[error("upstream returned a malformed response: {0}")]
    Malformed(String),
}

/// One fill as returned by the upstream, before `fill_id` derivation or spot/perp
/// classification.
#[derive(Debug, Clone)]
pub struct UpstreamFill {
    pub tid: u64,
    pub hash: String,
    pub ts: OffsetDateTime,
    pub coin: String,
    pub side: String,
    pub px: Decimal,
    pub sz: Decimal,
}

/// Opaque `FetchFills(address, startMillis) -> []Fill` collaborator. Its transport-level
/// retry policy is minimal by design; the Governor and Job Store own retry policy.
#[trait_variant::make(Send)]
pub trait Upstream
where
    Self: Send + Sync + 'static,
{
    async fn fetch_fills(
        &self,
        address: &WalletAddress,
        start_millis: i64,
    ) -> Result<Vec<UpstreamFill>, UpstreamError>;
}

#[derive(Debug, Error)]
pub enum FetcherError {
    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Governor(#[from] GovernorError),

    #[error(transparent)]
    JobStore(#[from] JobStoreError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("failed to encode job payload")]
    Encode(#[from] serde_json::Error),
}

/// Cursor and raw-fill access scoped to the fetcher. Storage methods return `sqlx::Error`
/// directly; the handler is the one place that widens into `FetcherError`.
#[trait_variant::make(Send)]
pub trait FetcherStorage
where
    Self: Clone + Send + Sync + 'static,
{
    async fn cursor_ts(&self, org_id: Uuid, wallet_id: WalletId) -> Result<OffsetDateTime, sqlx::Error>;

    /// Bulk idempotent insert; returns the number of rows actually inserted (conflicts are
    /// silently skipped).
    async fn insert_fills(&self, fills: &[Fill]) -> Result<u64, sqlx::Error>;
}

/// Runs the `ingest_wallet` job to completion: reads the cursor, calls the upstream through the
/// governor, inserts new fills idempotently, advances the cursor, and chains the per-day rollup.
pub async fn run_ingest_wallet<U, G, J, S, St>(
    upstream: &U,
    governor: &G,
    job_store: &J,
    scheduler: &S,
    storage: &St,
    overlap: Duration,
    org_id: Uuid,
    wallet_id: WalletId,
    address: &WalletAddress,
) -> Result<(), FetcherError>
where
    U: Upstream,
    G: Governor,
    J: JobStore,
    S: Scheduler,
    St: FetcherStorage,
{
    let result = run_ingest_wallet_inner(
        upstream, governor, job_store, storage, overlap, org_id, wallet_id, address,
    )
    .await;

    match &result {
        Ok(Some(new_cursor_ts)) => {
            scheduler
                .update_cursor(
                    org_id,
                    wallet_id,
                    FetchOutcome::Success {
                        new_cursor_ts: *new_cursor_ts,
                    },
                )
                .await?;
        }
        Ok(None) => {
            let cursor_ts = storage.cursor_ts(org_id, wallet_id).await?;
            scheduler
                .update_cursor(org_id, wallet_id, FetchOutcome::Success { new_cursor_ts: cursor_ts })
                .await?;
        }
        Err(_) => {
            scheduler
                .update_cursor(org_id, wallet_id, FetchOutcome::Failure)
                .await?;
        }
    }

    result.map(|_| ())
}

/// Returns `Ok(Some(new_cursor_ts))` when fills were inserted and the cursor should advance,
/// `Ok(None)` when the upstream had nothing new.
async fn run_ingest_wallet_inner<U, G, J, St>(
    upstream: &U,
    governor: &G,
    job_store: &J,
    storage: &St,
    overlap: Duration,
    org_id: Uuid,
    wallet_id: WalletId,
    address: &WalletAddress,
) -> Result<Option<OffsetDateTime>, FetcherError>
where
    U: Upstream,
    G: Governor,
    J: JobStore,
    St: FetcherStorage,
{
    let cursor_ts = storage.cursor_ts(org_id, wallet_id).await?;
    let start = (cursor_ts - overlap).max(OffsetDateTime::UNIX_EPOCH);
    let start_millis = (start - OffsetDateTime::UNIX_EPOCH).whole_milliseconds().max(0) as i64;

    governor.acquire(governor.config().default_cost).await?;

    let upstream_fills = match upstream.fetch_fills(address, start_millis).await {
        Ok(fills) => fills,
        Err(UpstreamError::RateLimited) => {
            governor.report_rate_limited().await?;
            return Err(FetcherError::Upstream(UpstreamError::RateLimited));
        }
        Err(other) => return Err(FetcherError::Upstream(other)),
    };

    governor.adjust_for_response(upstream_fills.len()).await?;

    if upstream_fills.is_empty() {
        return Ok(None);
    }

    let classifier = HeuristicCoinClassifier;
    let fills: Vec<Fill> = upstream_fills
        .iter()
        .filter_map(|uf| build_fill(org_id, wallet_id, uf, &classifier))
        .collect();

    let new_cursor_ts = fills.iter().map(|f| f.ts).max().unwrap_or(cursor_ts);

    storage.insert_fills(&fills).await?;

    let days: BTreeSet<time::Date> = fills.iter().map(|f| f.ts.date()).collect();
    let days: Vec<time::Date> = days.into_iter().collect();

    let payload = serde_json::to_value(JobPayload::RollupWalletDay {
        org_id,
        wallet_id,
        days,
    })?;

    job_store
        .enqueue(org_id, JobType::RollupWalletDay, payload, OffsetDateTime::now_utc())
        .await?;

    info!(wallet_id, inserted = fills.len(); "ingested wallet fills");

    Ok(Some(new_cursor_ts))
}

fn build_fill(
    org_id: Uuid,
    wallet_id: WalletId,
    upstream: &UpstreamFill,
    classifier: &impl CoinClassifier,
) -> Option<Fill> {
    let side = match Side::from_upstream(&upstream.side) {
        Some(side) => side,
        None => {
            warn!(side = upstream.side.as_str(); "dropping fill with unrecognized side");
            return None;
        }
    };

    let (is_spot, is_perp) = classifier.classify(&upstream.coin);

    Some(Fill {
        org_id,
        wallet_id,
        fill_id: FillId::derive(upstream.tid, &upstream.hash),
        ts: upstream.ts,
        coin: upstream.coin.clone(),
        side,
        px: upstream.px,
        sz: upstream.sz,
        is_spot,
        is_perp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn build_fill_drops_unrecognized_side() {
        let upstream = UpstreamFill {
            tid: 1,
            hash: "abc".into(),
            ts: datetime!(2026-01-01 00:00:00 UTC),
            coin: "ETH".into(),
            side: "X".into(),
            px: Decimal::from(100),
            sz: Decimal::from(1),
        };

        let classifier = HeuristicCoinClassifier;
        assert!(build_fill(Uuid::nil(), 1, &upstream, &classifier).is_none());
    }

    #[test]
    fn build_fill_classifies_perp_coin() {
        let upstream = UpstreamFill {
            tid: 1,
            hash: "abc".into(),
            ts: datetime!(2026-01-01 00:00:00 UTC),
            coin: "ETH".into(),
            side: "A".into(),
            px: Decimal::from(100),
            sz: Decimal::from(1),
        };

        let classifier = HeuristicCoinClassifier;
        let fill = build_fill(Uuid::nil(), 1, &upstream, &classifier).unwrap();
        assert!(fill.is_perp);
        assert!(!fill.is_spot);
    }
}
