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

use anyhow::Context;
use ingest_common::domain::{Job, JobPayload};
use ingest_fetcher::{run_ingest_wallet, HttpUpstream, PostgresFetcherStorage};
use ingest_jobs::PostgresJobStore;
use ingest_rollup::{run_rollup_global_day, run_rollup_wallet_day, PostgresRollupStorage};
use ingest_scheduler::PostgresScheduler;

use crate::governor::AnyGovernor;

/// Flat `{type -> handler}` registry: every job is dispatched here regardless of which claim
/// loop picked it up.
#[derive(Clone)]
pub struct Handlers {
    pub governor: AnyGovernor,
    pub job_store: PostgresJobStore,
    pub scheduler: PostgresScheduler<AnyGovernor, PostgresJobStore>,
    pub fetcher_storage: PostgresFetcherStorage,
    pub rollup_storage: PostgresRollupStorage,
    pub upstream: HttpUpstream,
    pub overlap: time::Duration,
}

impl Handlers {
    pub async fn dispatch(&self, job: &Job) -> anyhow::Result<()> {
        let payload = job.payload().context("decoding job payload")?;

        match payload {
            JobPayload::IngestWallet {
                org_id,
                wallet_id,
                address,
            } => run_ingest_wallet(
                &self.upstream,
                &self.governor,
                &self.job_store,
                &self.scheduler,
                &self.fetcher_storage,
                self.overlap,
                org_id,
                wallet_id,
                &address,
            )
            .await
            .context("ingest_wallet handler failed"),

            JobPayload::RollupWalletDay {
                org_id,
                wallet_id,
                days,
            } => run_rollup_wallet_day(&self.rollup_storage, &self.job_store, org_id, wallet_id, &days)
                .await
                .context("rollup_wallet_day handler failed"),

            JobPayload::RollupGlobalDay { org_id, days } => {
                run_rollup_global_day(&self.rollup_storage, org_id, &days)
                    .await
                    .context("rollup_global_day handler failed")
            }
        }
    }
}
