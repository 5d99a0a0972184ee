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

use std::sync::Mutex;

use ingest_common::domain::{GovernorConfig, WalletAddress};
use ingest_fetcher::{run_ingest_wallet, PostgresFetcherStorage, Upstream, UpstreamError, UpstreamFill};
use ingest_governor::LocalGovernor;
use ingest_jobs::{JobStore, PostgresJobStore};
use ingest_scheduler::PostgresScheduler;
use ingest_tests::{register_wallet, seed_cursor, TestDb};
use rust_decimal::Decimal;
use time::macros::datetime;
use uuid::Uuid;

/// Hands back one scripted response per call, in order, and records every call it received.
struct ScriptedUpstream {
    responses: Mutex<Vec<Result<Vec<UpstreamFill>, UpstreamError>>>,
    calls: Mutex<Vec<i64>>,
}

impl ScriptedUpstream {
    fn new(responses: Vec<Result<Vec<UpstreamFill>, UpstreamError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl Upstream for ScriptedUpstream {
    async fn fetch_fills(&self, _address: &WalletAddress, start_millis: i64) -> Result<Vec<UpstreamFill>, UpstreamError> {
        self.calls.lock().unwrap().push(start_millis);
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(vec![])
        } else {
            responses.remove(0)
        }
    }
}

fn governor() -> LocalGovernor {
    LocalGovernor::new(GovernorConfig::default())
}

#[tokio::test]
async fn happy_path_inserts_fills_and_advances_the_cursor() -> anyhow::Result<()> {
    let db = TestDb::start().await?;
    let org_id = Uuid::new_v4();
    let address = WalletAddress::parse("0x0000000000000000000000000000000000000005")?;
    let wallet_id = register_wallet(&db.pool, org_id, address.as_str()).await?;
    seed_cursor(&db.pool, org_id, wallet_id).await?;

    let fill = UpstreamFill {
        tid: 1,
        hash: "h1".into(),
        ts: datetime!(2026-03-15 10:00:00 UTC),
        coin: "ETH".into(),
        side: "A".into(),
        px: Decimal::from(2000),
        sz: Decimal::from(1),
    };
    let upstream = ScriptedUpstream::new(vec![Ok(vec![fill])]);

    let job_store = PostgresJobStore::new(db.pool.clone());
    let governor = governor();
    let scheduler = PostgresScheduler::new(db.pool.clone(), governor.clone(), job_store.clone(), 50);
    let storage = PostgresFetcherStorage::new(db.pool.clone());

    run_ingest_wallet(
        &upstream,
        &governor,
        &job_store,
        &scheduler,
        &storage,
        time::Duration::minutes(10),
        org_id,
        wallet_id,
        &address,
    )
    .await?;

    let count: i64 = sqlx::query_scalar("select count(*) from hl_fills_raw where org_id = $1 and wallet_id = $2")
        .bind(org_id)
        .bind(wallet_id)
        .fetch_one(&*db.pool)
        .await?;
    assert_eq!(count, 1);

    let cursor_ts: time::OffsetDateTime =
        sqlx::query_scalar("select cursor_ts from hl_ingest_cursor where org_id = $1 and wallet_id = $2")
            .bind(org_id)
            .bind(wallet_id)
            .fetch_one(&*db.pool)
            .await?;
    assert_eq!(cursor_ts, datetime!(2026-03-15 10:00:00 UTC));

    let job_counts = job_store.status_counts().await?;
    assert_eq!(job_counts.queued, 1, "rollup_wallet_day should have been chained");

    Ok(())
}

#[tokio::test]
async fn rerunning_with_overlap_does_not_duplicate_fills() -> anyhow::Result<()> {
    let db = TestDb::start().await?;
    let org_id = Uuid::new_v4();
    let address = WalletAddress::parse("0x0000000000000000000000000000000000000006")?;
    let wallet_id = register_wallet(&db.pool, org_id, address.as_str()).await?;
    seed_cursor(&db.pool, org_id, wallet_id).await?;

    let fill = UpstreamFill {
        tid: 42,
        hash: "h42".into(),
        ts: datetime!(2026-03-16 08:00:00 UTC),
        coin: "BTC".into(),
        side: "B".into(),
        px: Decimal::from(50000),
        sz: Decimal::from(1),
    };

    let job_store = PostgresJobStore::new(db.pool.clone());
    let governor = governor();
    let scheduler = PostgresScheduler::new(db.pool.clone(), governor.clone(), job_store.clone(), 50);
    let storage = PostgresFetcherStorage::new(db.pool.clone());

    // First run: the upstream returns the fill.
    let upstream = ScriptedUpstream::new(vec![Ok(vec![fill.clone()])]);
    run_ingest_wallet(
        &upstream,
        &governor,
        &job_store,
        &scheduler,
        &storage,
        time::Duration::minutes(10),
        org_id,
        wallet_id,
        &address,
    )
    .await?;

    // Second run: the overlap window causes the upstream to hand back the same fill again.
    let upstream = ScriptedUpstream::new(vec![Ok(vec![fill])]);
    run_ingest_wallet(
        &upstream,
        &governor,
        &job_store,
        &scheduler,
        &storage,
        time::Duration::minutes(10),
        org_id,
        wallet_id,
        &address,
    )
    .await?;

    let count: i64 = sqlx::query_scalar("select count(*) from hl_fills_raw where org_id = $1 and wallet_id = $2")
        .bind(org_id)
        .bind(wallet_id)
        .fetch_one(&*db.pool)
        .await?;
    assert_eq!(count, 1, "the conflicting fill must not be inserted twice");

    let cursor_ts: time::OffsetDateTime =
        sqlx::query_scalar("select cursor_ts from hl_ingest_cursor where org_id = $1 and wallet_id = $2")
            .bind(org_id)
            .bind(wallet_id)
            .fetch_one(&*db.pool)
            .await?;
    assert_eq!(cursor_ts, datetime!(2026-03-16 08:00:00 UTC), "cursor must not regress");

    Ok(())
}

#[tokio::test]
async fn upstream_rate_limit_propagates_and_leaves_the_cursor_untouched() -> anyhow::Result<()> {
    let db = TestDb::start().await?;
    let org_id = Uuid::new_v4();
    let address = WalletAddress::parse("0x0000000000000000000000000000000000000007")?;
    let wallet_id = register_wallet(&db.pool, org_id, address.as_str()).await?;
    seed_cursor(&db.pool, org_id, wallet_id).await?;

    let upstream = ScriptedUpstream::new(vec![Err(UpstreamError::RateLimited)]);
    let job_store = PostgresJobStore::new(db.pool.clone());
    let governor = governor();
    let scheduler = PostgresScheduler::new(db.pool.clone(), governor.clone(), job_store.clone(), 50);
    let storage = PostgresFetcherStorage::new(db.pool.clone());

    let result = run_ingest_wallet(
        &upstream,
        &governor,
        &job_store,
        &scheduler,
        &storage,
        time::Duration::minutes(10),
        org_id,
        wallet_id,
        &address,
    )
    .await;
    assert!(result.is_err());

    let (error_count,): (i32,) =
        sqlx::query_as("select error_count from hl_ingest_cursor where org_id = $1 and wallet_id = $2")
            .bind(org_id)
            .bind(wallet_id)
            .fetch_one(&*db.pool)
            .await?;
    assert_eq!(error_count, 1);

    Ok(())
}
