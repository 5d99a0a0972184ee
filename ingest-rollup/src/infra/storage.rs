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
use ingest_common::{domain::WalletId, infra::pool::postgres::PostgresPool};
use time::Date;
use uuid::Uuid;

use crate::domain::RollupStorage;

#[derive(Debug, Clone)]
pub struct PostgresRollupStorage {
    pool: PostgresPool,
}

impl PostgresRollupStorage {
    pub fn new(pool: PostgresPool) -> Self {
        Self { pool }
    }
}

impl RollupStorage for PostgresRollupStorage {
    #[trace]
    async fn rollup_wallet_day(&self, org_id: Uuid, wallet_id: WalletId, day: Date) -> Result<(), sqlx::Error> {
        sqlx::query(
            "insert into wallet_day_metrics \
                 (org_id, wallet_id, day, spot_volume_usd, perp_volume_usd, trades_count, \
                  last_trade_ts, updated_at) \
             select $1, $2, $3, \
                 coalesce(sum(px * sz) filter (where is_spot), 0), \
                 coalesce(sum(px * sz) filter (where is_perp), 0), \
                 count(*), \
                 max(ts), \
                 now() \
             from hl_fills_raw \
             where org_id = $1 and wallet_id = $2 \
               and ts >= $3::timestamptz and ts < ($3::date + interval '1 day')::timestamptz \
             on conflict (org_id, wallet_id, day) do update set \
                 spot_volume_usd = excluded.spot_volume_usd, \
                 perp_volume_usd = excluded.perp_volume_usd, \
                 trades_count = excluded.trades_count, \
                 last_trade_ts = excluded.last_trade_ts, \
                 updated_at = excluded.updated_at",
        )
        .bind(org_id)
        .bind(wallet_id)
        .bind(day)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    #[trace]
    async fn rollup_global_day(&self, org_id: Uuid, day: Date) -> Result<(), sqlx::Error> {
        sqlx::query(
            "insert into global_day_metrics \
                 (org_id, day, dau, spot_volume_usd, perp_volume_usd, \
                  avg_spot_volume_per_user, avg_perp_volume_per_user, updated_at) \
             select $1, $2, \
                 count(*) filter (where trades_count > 0), \
                 coalesce(sum(spot_volume_usd), 0), \
                 coalesce(sum(perp_volume_usd), 0), \
                 case when count(*) filter (where trades_count > 0) = 0 then 0 \
                      else coalesce(sum(spot_volume_usd), 0) / count(*) filter (where trades_count > 0) end, \
                 case when count(*) filter (where trades_count > 0) = 0 then 0 \
                      else coalesce(sum(perp_volume_usd), 0) / count(*) filter (where trades_count > 0) end, \
                 now() \
             from wallet_day_metrics \
             where org_id = $1 and day = $2 \
             on conflict (org_id, day) do update set \
                 dau = excluded.dau, \
                 spot_volume_usd = excluded.spot_volume_usd, \
                 perp_volume_usd = excluded.perp_volume_usd, \
                 avg_spot_volume_per_user = excluded.avg_spot_volume_per_user, \
                 avg_perp_volume_per_user = excluded.avg_perp_volume_per_user, \
                 updated_at = excluded.updated_at",
        )
        .bind(org_id)
        .bind(day)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    async fn delete_wallet_day_range(
        &self,
        org_id: Uuid,
        wallet_id: Option<WalletId>,
        from_day: Date,
        to_day: Date,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "delete from wallet_day_metrics \
             where org_id = $1 and day between $2 and $3 and ($4::bigint is null or wallet_id = $4)",
        )
        .bind(org_id)
        .bind(from_day)
        .bind(to_day)
        .bind(wallet_id)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    async fn delete_global_day_range(&self, org_id: Uuid, from_day: Date, to_day: Date) -> Result<(), sqlx::Error> {
        sqlx::query("delete from global_day_metrics where org_id = $1 and day between $2 and $3")
            .bind(org_id)
            .bind(from_day)
            .bind(to_day)
            .execute(&*self.pool)
            .await?;

        Ok(())
    }

    async fn distinct_wallets_in_range(&self, org_id: Uuid, from_day: Date, to_day: Date) -> Result<Vec<WalletId>, sqlx::Error> {
        sqlx::query_scalar(
            "select distinct wallet_id from hl_fills_raw \
             where org_id = $1 and ts >= $2::timestamptz and ts < ($3::date + interval '1 day')::timestamptz",
        )
        .bind(org_id)
        .bind(from_day)
        .bind(to_day)
        .fetch_all(&*self.pool)
        .await
    }
}
