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
use derive_more::{AsRef, Display};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// The stable identifier of a fill on the upstream, derived from its trade ID and transaction
/// hash. Stable across re-fetches so duplicate inserts are rejected by the unique constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, AsRef, Display, Serialize, Deserialize)]
#[as_ref(str)]
pub struct FillId(String);

impl FillId {
    /// Derive a fill ID deterministically from the upstream trade ID and transaction hash.
    pub fn derive(tid: u64, hash: &str) -> Self {
        Self(format!("{tid}:{hash}"))
    }
}

impl sqlx::Type<sqlx::Postgres> for FillId {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }
}

impl sqlx::Encode<'_, sqlx::Postgres> for FillId {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode(self.0.as_str(), buf)
    }
}

impl sqlx::Decode<'_, sqlx::Postgres> for FillId {
    fn decode(
        value: sqlx::postgres::PgValueRef<'_>,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self(s))
    }
}

/// The upstream's resting side for a fill: ask or bid. Business-direction semantics across
/// spot vs. perp are intentionally not derived here; see the open question in the design notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "hl_fill_side", rename_all = "UPPERCASE")]
pub enum Side {
    #[serde(rename = "A")]
    Ask,
    #[serde(rename = "B")]
    Bid,
}

impl Side {
    pub fn from_upstream(s: &str) -> Option<Self> {
        match s {
            "A" => Some(Side::Ask),
            "B" => Some(Side::Bid),
            _ => None,
        }
    }
}

/// A single executed trade attributed to one wallet at one instant. Append-only: once inserted,
/// a fill is never updated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Fill {
    pub org_id: Uuid,
    pub wallet_id: WalletId,
    pub fill_id: FillId,
    pub ts: OffsetDateTime,
    pub coin: String,
    pub side: Side,
    pub px: Decimal,
    pub sz: Decimal,
    pub is_spot: bool,
    pub is_perp: bool,
}

/// Pluggable policy for classifying a coin symbol as spot or perp. The default implementation
/// follows the upstream heuristic documented in the design notes: spot symbols contain `/` or
/// start with `@`, everything else is perp. Implementers who learn the upstream's authoritative
/// taxonomy should swap this out rather than editing call sites.
pub trait CoinClassifier: Send + Sync {
    /// Returns `(is_spot, is_perp)`, always exactly one `true`.
    fn classify(&self, coin: &str) -> (bool, bool);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicCoinClassifier;

impl CoinClassifier for HeuristicCoinClassifier {
    fn classify(&self, coin: &str) -> (bool, bool) {
        let is_spot = coin.contains('/') || coin.starts_with('@');
        (is_spot, !is_spot)
    }
}
