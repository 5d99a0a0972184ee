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

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// The fixed key of the single, process-wide shared rate-limit state row.
pub const RATE_LIMIT_STATE_KEY: &str = "upstream";

/// The persisted state of the shared token bucket. A single row, mutated under `SELECT ...
/// FOR UPDATE` so at most one worker observes and advances it at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RateLimitState {
    pub key: String,
    pub tokens: Decimal,
    pub last_refill: OffsetDateTime,
    pub requests_this_minute: i32,
    pub weight_this_minute: i32,
    pub minute_start: OffsetDateTime,
    pub is_rate_limited: bool,
    pub rate_limited_until: Option<OffsetDateTime>,
}

/// Tunables for the token bucket, calibrated to the upstream's 1200-weight-per-minute ceiling
/// with roughly 33% headroom.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GovernorConfig {
    pub max_tokens: Decimal,
    pub refill_rate_per_sec: Decimal,
    pub default_cost: Decimal,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            max_tokens: Decimal::from(100),
            refill_rate_per_sec: Decimal::new(67, 2),
            default_cost: Decimal::from(20),
        }
    }
}
