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

use ingest_common::domain::{JobStatus, JobType};
use ingest_jobs::{JobStore, PostgresJobStore};
use ingest_tests::TestDb;
use time::OffsetDateTime;
use uuid::Uuid;

#[tokio::test]
async fn claim_locks_a_job_and_complete_clears_it() -> anyhow::Result<()> {
    let db = TestDb::start().await?;
    let store = PostgresJobStore::new(db.pool.clone());
    let org_id = Uuid::new_v4();

    let job = store
        .enqueue(org_id, JobType::RollupGlobalDay, serde_json::json!({"days": []}), OffsetDateTime::now_utc())
        .await?;

    let claimed = store.claim(org_id, "worker-a", 10, 300).await?;
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].id, job.id);
    assert_eq!(claimed[0].status, JobStatus::Running);
    assert_eq!(claimed[0].attempts, 1);

    // A second claim from another worker sees nothing: the row is locked and not yet expired.
    let claimed_again = store.claim(org_id, "worker-b", 10, 300).await?;
    assert!(claimed_again.is_empty());

    store.complete(job.id).await?;

    let counts = store.status_counts().await?;
    assert_eq!(counts.succeeded, 1);
    assert_eq!(counts.running, 0);

    Ok(())
}

#[tokio::test]
async fn claim_never_returns_another_orgs_jobs() -> anyhow::Result<()> {
    let db = TestDb::start().await?;
    let store = PostgresJobStore::new(db.pool.clone());
    let org_a = Uuid::new_v4();
    let org_b = Uuid::new_v4();

    let job_a = store
        .enqueue(org_a, JobType::RollupGlobalDay, serde_json::json!({"days": []}), OffsetDateTime::now_utc())
        .await?;
    let job_b = store
        .enqueue(org_b, JobType::RollupGlobalDay, serde_json::json!({"days": []}), OffsetDateTime::now_utc())
        .await?;

    let claimed_a = store.claim(org_a, "worker-a", 10, 300).await?;
    assert_eq!(claimed_a.len(), 1);
    assert_eq!(claimed_a[0].id, job_a.id);

    let claimed_b = store.claim(org_b, "worker-b", 10, 300).await?;
    assert_eq!(claimed_b.len(), 1);
    assert_eq!(claimed_b[0].id, job_b.id);

    Ok(())
}

#[tokio::test]
async fn fail_requeues_with_backoff_until_max_attempts_then_terminal() -> anyhow::Result<()> {
    let db = TestDb::start().await?;
    let store = PostgresJobStore::with_max_attempts(db.pool.clone(), 2);
    let org_id = Uuid::new_v4();

    let job = store
        .enqueue(org_id, JobType::RollupGlobalDay, serde_json::json!({"days": []}), OffsetDateTime::now_utc())
        .await?;

    // Attempt 1: claim, fail. Job re-queues (attempts=1 < max_attempts=2) with a future run_at.
    let claimed = store.claim(org_id, "worker-a", 10, 300).await?;
    assert_eq!(claimed.len(), 1);
    store.fail(job.id, "transient upstream error").await?;

    let counts = store.status_counts().await?;
    assert_eq!(counts.queued, 1);
    assert_eq!(counts.failed, 0);

    // The re-queued run_at is in the future, so an immediate claim sees nothing.
    let claimed_too_soon = store.claim(org_id, "worker-a", 10, 300).await?;
    assert!(claimed_too_soon.is_empty());

    // Force the job runnable now to exercise the terminal path without waiting out the backoff.
    sqlx::query("update jobs set run_at = now() where id = $1")
        .bind(job.id)
        .execute(&*db.pool)
        .await?;

    let claimed = store.claim(org_id, "worker-a", 10, 300).await?;
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].attempts, 2);
    store.fail(job.id, "transient upstream error").await?;

    let counts = store.status_counts().await?;
    assert_eq!(counts.failed, 1);
    assert_eq!(counts.queued, 0);

    Ok(())
}

#[tokio::test]
async fn recover_stuck_requeues_expired_leases() -> anyhow::Result<()> {
    let db = TestDb::start().await?;
    let store = PostgresJobStore::new(db.pool.clone());
    let org_id = Uuid::new_v4();

    let job = store
        .enqueue(org_id, JobType::RollupGlobalDay, serde_json::json!({"days": []}), OffsetDateTime::now_utc())
        .await?;
    store.claim(org_id, "worker-a", 10, 300).await?;

    // Simulate a crashed worker: its lease has already expired.
    sqlx::query("update jobs set lock_expires_at = now() - interval '1 minute' where id = $1")
        .bind(job.id)
        .execute(&*db.pool)
        .await?;

    let recovered = store.recover_stuck().await?;
    assert_eq!(recovered, 1);

    let counts = store.status_counts().await?;
    assert_eq!(counts.queued, 1);
    assert_eq!(counts.running, 0);

    let reclaimed = store.claim(org_id, "worker-b", 10, 300).await?;
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].attempts, 2);

    Ok(())
}

#[tokio::test]
async fn has_pending_ingest_wallet_job_detects_dedup_candidates() -> anyhow::Result<()> {
    let db = TestDb::start().await?;
    let store = PostgresJobStore::new(db.pool.clone());
    let org_id = Uuid::new_v4();
    let wallet_id = ingest_tests::register_wallet(&db.pool, org_id, "0x0000000000000000000000000000000000000001").await?;

    assert!(!store.has_pending_ingest_wallet_job(org_id, wallet_id).await?);

    let payload = serde_json::json!({
        "type": "ingest_wallet",
        "org_id": org_id,
        "wallet_id": wallet_id,
        "address": "0x0000000000000000000000000000000000000001",
    });
    store
        .enqueue(org_id, JobType::IngestWallet, payload, OffsetDateTime::now_utc())
        .await?;

    assert!(store.has_pending_ingest_wallet_job(org_id, wallet_id).await?);

    Ok(())
}

#[tokio::test]
async fn cancel_wallet_jobs_only_cancels_queued_ingest_wallet_jobs_for_that_wallet() -> anyhow::Result<()> {
    let db = TestDb::start().await?;
    let store = PostgresJobStore::new(db.pool.clone());
    let org_id = Uuid::new_v4();
    let wallet_id =
        ingest_tests::register_wallet(&db.pool, org_id, "0x0000000000000000000000000000000000000009").await?;
    let other_wallet_id =
        ingest_tests::register_wallet(&db.pool, org_id, "0x000000000000000000000000000000000000aa").await?;

    let payload = |wallet_id: i64| {
        serde_json::json!({
            "type": "ingest_wallet",
            "org_id": org_id,
            "wallet_id": wallet_id,
            "address": "0x0000000000000000000000000000000000000009",
        })
    };

    let target_job = store
        .enqueue(org_id, JobType::IngestWallet, payload(wallet_id), OffsetDateTime::now_utc())
        .await?;
    let other_wallet_job = store
        .enqueue(org_id, JobType::IngestWallet, payload(other_wallet_id), OffsetDateTime::now_utc())
        .await?;
    let rollup_job = store
        .enqueue(org_id, JobType::RollupGlobalDay, serde_json::json!({"days": []}), OffsetDateTime::now_utc())
        .await?;

    // A running ingest_wallet job for the same wallet must survive cancellation untouched.
    let running_job = store
        .enqueue(org_id, JobType::IngestWallet, payload(wallet_id), OffsetDateTime::now_utc())
        .await?;
    store.claim(org_id, "worker-a", 10, 300).await?;
    sqlx::query("update jobs set status = 'queued' where id = any($1)")
        .bind(vec![target_job.id, other_wallet_job.id, rollup_job.id])
        .execute(&*db.pool)
        .await?;

    let canceled = store.cancel_wallet_jobs(org_id, wallet_id).await?;
    assert_eq!(canceled, 1);

    let target_status: JobStatus = sqlx::query_scalar("select status from jobs where id = $1")
        .bind(target_job.id)
        .fetch_one(&*db.pool)
        .await?;
    assert_eq!(target_status, JobStatus::Canceled);

    let other_wallet_status: JobStatus = sqlx::query_scalar("select status from jobs where id = $1")
        .bind(other_wallet_job.id)
        .fetch_one(&*db.pool)
        .await?;
    assert_eq!(other_wallet_status, JobStatus::Queued);

    let rollup_status: JobStatus = sqlx::query_scalar("select status from jobs where id = $1")
        .bind(rollup_job.id)
        .fetch_one(&*db.pool)
        .await?;
    assert_eq!(rollup_status, JobStatus::Queued);

    let running_status: JobStatus = sqlx::query_scalar("select status from jobs where id = $1")
        .bind(running_job.id)
        .fetch_one(&*db.pool)
        .await?;
    assert_eq!(running_status, JobStatus::Running);

    Ok(())
}
