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
use ingest_common::{domain::Fill, domain::WalletId, infra::pool::postgres::PostgresPool};
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::FetcherStorage;

/// Postgres binds at most 65535 parameters per statement; at 10 columns per fill this caps a
/// single `push_values` batch well above the ~2000-fill-per-job ceiling the upstream imposes.
const MAX_FILLS_PER_STATEMENT: usize = 2000;

#[derive(Debug, Clone)]
pub struct PostgresFetcherStorage {
    pool: PostgresPool,
}

impl PostgresFetcherStorage {
    pub fn new(pool: PostgresPool) -> Self {
        Self { pool }
    }
}

impl FetcherStorage for PostgresFetcherStorage {
    async fn cursor_ts(&self, org_id: Uuid, wallet_id: WalletId) -> Result<OffsetDateTime, sqlx::Error> {
        sqlx::query_scalar(
            "select cursor_ts from hl_ingest_cursor where org_id = $1 and wallet_id = $2",
        )
        .bind(org_id)
        .bind(wallet_id)
        .fetch_one(&*self.pool)
        .await
    }

    #[trace]
    async fn insert_fills(&self, fills: &[Fill]) -> Result<u64, sqlx::Error> {
        if fills.is_empty() {
            return Ok(0);
        }

        let mut inserted = 0u64;

        for chunk in fills.chunks(MAX_FILLS_PER_STATEMENT) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "insert into hl_fills_raw \
                     (org_id, wallet_id, fill_id, ts, coin, side, px, sz, is_spot, is_perp) ",
            );

            builder.push_values(chunk, |mut q, fill| {
                q.push_bind(fill.org_id)
                    .push_bind(fill.wallet_id)
                    .push_bind(&fill.fill_id)
                    .push_bind(fill.ts)
                    .push_bind(&fill.coin)
                    .push_bind(fill.side)
                    .push_bind(fill.px)
                    .push_bind(fill.sz)
                    .push_bind(fill.is_spot)
                    .push_bind(fill.is_perp);
            });

            builder.push(" on conflict (org_id, wallet_id, fill_id, ts) do nothing");

            let result = builder.build().execute(&*self.pool).await?;
            inserted += result.rows_affected();
        }

        Ok(inserted)
    }
}
