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

use derive_more::{AsRef, Display};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

/// A dense, per-wallet integer identifier assigned at registration.
pub type WalletId = i64;

/// A 20-byte EVM-style address, normalized to lowercase hex with a `0x` prefix.
///
/// Equality and storage are always on the normalized form, so the same address spelled with
/// mixed case can never create two distinct wallet rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, AsRef, Display, Serialize)]
#[as_ref(str)]
pub struct WalletAddress(String);

#[derive(Debug, Error)]
pub enum ParseWalletAddressError {
    #[error("address must start with 0x")]
    MissingPrefix,

    #[error("address must encode exactly 20 bytes, got {0}")]
    WrongLength(usize),

    #[error("address contains invalid hex")]
    InvalidHex(#[from] const_hex::FromHexError),
}

impl WalletAddress {
    pub fn parse(address: impl AsRef<str>) -> Result<Self, ParseWalletAddressError> {
        let address = address.as_ref();

        let hex = address
            .strip_prefix("0x")
            .or_else(|| address.strip_prefix("0X"))
            .ok_or(ParseWalletAddressError::MissingPrefix)?;

        let bytes = const_hex::decode(hex)?;
        if bytes.len() != 20 {
            return Err(ParseWalletAddressError::WrongLength(bytes.len()));
        }

        Ok(Self(format!("0x{}", hex.to_ascii_lowercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for WalletAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        WalletAddress::parse(s).map_err(serde::de::Error::custom)
    }
}

impl sqlx::Type<sqlx::Postgres> for WalletAddress {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }
}

impl sqlx::Encode<'_, sqlx::Postgres> for WalletAddress {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode(self.0.as_str(), buf)
    }
}

impl sqlx::Decode<'_, sqlx::Postgres> for WalletAddress {
    fn decode(
        value: sqlx::postgres::PgValueRef<'_>,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self(s))
    }
}

/// A wallet known to the ingestion core, addressable by its dense integer ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Wallet {
    pub wallet_id: WalletId,
    pub address: WalletAddress,
    pub is_active: bool,
    pub label: Option<String>,
}

/// The link between an org and a wallet it has registered for ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrgWallet {
    pub org_id: Uuid,
    pub wallet_id: WalletId,
    pub added_by: String,
    pub created_at: OffsetDateTime,
}

/// An active wallet together with the fields the Scheduler needs to classify it, produced by a
/// join across `org_wallets`, `wallets` and `hl_ingest_cursor`.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct SchedulableWallet {
    pub org_id: Uuid,
    pub wallet_id: WalletId,
    pub address: WalletAddress,
    pub last_trade_ts: Option<OffsetDateTime>,
    pub next_run_at: OffsetDateTime,
}
