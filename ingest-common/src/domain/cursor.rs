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
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// The status of a wallet's last ingestion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "hl_cursor_status", rename_all = "lowercase")]
pub enum CursorStatus {
    Ok,
    Error,
}

/// Per-wallet high-water mark indicating the upstream timestamp through which fills have been
/// successfully ingested. Created at wallet registration, mutated only by the Fetcher on
/// success/failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct IngestCursor {
    pub org_id: Uuid,
    pub wallet_id: WalletId,
    pub cursor_ts: OffsetDateTime,
    pub last_success_at: Option<OffsetDateTime>,
    pub status: CursorStatus,
    pub error_count: i32,
    pub next_run_at: OffsetDateTime,
}
