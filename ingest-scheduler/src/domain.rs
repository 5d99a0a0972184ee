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

use ingest_common::domain::WalletId;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Governor(#[from] ingest_governor::GovernorError),

    #[error(transparent)]
    JobStore(#[from] ingest_jobs::JobStoreError),

    #[error("failed to encode job payload")]
    Encode(#[from] serde_json::Error),
}

/// Activity class driving a wallet's ingestion cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WalletClass {
    Hot,
    Warm,
    Cold,
}

impl WalletClass {
    /// Traded within the last 24h, 7d, or neither/unknown.
    pub fn classify(last_trade_ts: Option<OffsetDateTime>, now: OffsetDateTime) -> Self {
        match last_trade_ts {
            Some(ts) if now - ts <= Duration::hours(24) => WalletClass::Hot,
            Some(ts) if now - ts <= Duration::hours(168) => WalletClass::Warm,
            _ => WalletClass::Cold,
        }
    }

    pub fn base_interval(self) -> Duration {
        match self {
            WalletClass::Hot => Duration::seconds(60),
            WalletClass::Warm => Duration::seconds(900),
            WalletClass::Cold => Duration::seconds(3600),
        }
    }
}

/// Outcome of a completed `ingest_wallet` run, reported back through `Scheduler::update_cursor`.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Success { new_cursor_ts: OffsetDateTime },
    Failure,
}

/// `next_run_at` after a successful fetch: backoff resets, cadence resumes at the wallet's class
/// interval.
pub fn success_next_run_at(now: OffsetDateTime, class: WalletClass) -> OffsetDateTime {
    now + class.base_interval()
}

/// `next_run_at` after a failed fetch: `min(3600s, cold_base * 2^min(error_count, 6))`. Backoff
/// is always measured from the cold base regardless of the wallet's own class, so a failing hot
/// wallet backs off just as aggressively as a failing cold one.
pub fn failure_next_run_at(now: OffsetDateTime, error_count: i32) -> OffsetDateTime {
    let cold_base = WalletClass::Cold.base_interval().whole_seconds();
    let exponent = error_count.clamp(0, 6);
    let scaled = cold_base.saturating_mul(1i64 << exponent);
    let capped = scaled.min(3600);
    now + Duration::seconds(capped)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub scheduled: u64,
    pub skipped: u64,
}

/// Periodic tick logic plus the cursor-update API the Fetcher calls after each run. Owns no
/// in-process state; every call reads/writes through the store.
#[trait_variant::make(Send)]
pub trait Scheduler
where
    Self: Clone + Send + Sync + 'static,
{
    /// One scheduling pass: select due wallets hot-first, admit as many as the Governor has
    /// headroom for, skip any with a pending `ingest_wallet` job, enqueue the rest.
    async fn tick(&self, org_id: Uuid) -> Result<TickReport, SchedulerError>;

    async fn update_cursor(
        &self,
        org_id: Uuid,
        wallet_id: WalletId,
        outcome: FetchOutcome,
    ) -> Result<(), SchedulerError>;
}
