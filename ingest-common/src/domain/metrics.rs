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

use crate::domain::wallet::WalletId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

/// Per-wallet daily trading metrics, fully recomputed from raw fills for that day on every
/// rollup run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct WalletDayMetric {
    pub org_id: Uuid,
    pub wallet_id: WalletId,
    pub day: Date,
    pub spot_volume_usd: Decimal,
    pub perp_volume_usd: Decimal,
    pub trades_count: i64,
    pub last_trade_ts: Option<OffsetDateTime>,
    pub updated_at: OffsetDateTime,
}

/// Per-org daily metrics, derived from [`WalletDayMetric`] rows for that day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct GlobalDayMetric {
    pub org_id: Uuid,
    pub day: Date,
    pub dau: i64,
    pub spot_volume_usd: Decimal,
    pub perp_volume_usd: Decimal,
    pub avg_spot_volume_per_user: Decimal,
    pub avg_perp_volume_per_user: Decimal,
    pub updated_at: OffsetDateTime,
}
