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
use ingest_common::{
    domain::rate_limit::{GovernorConfig, RateLimitState, RATE_LIMIT_STATE_KEY},
    infra::pool::postgres::PostgresPool,
};
use log::{debug, warn};
use rust_decimal::{prelude::ToPrimitive, Decimal};
use sqlx::Postgres;
use time::OffsetDateTime;

use crate::domain::{response_adjustment, wait_secs_for, Governor, GovernorError};

/// Distributed token-bucket governor, backed by a single row in `rate_limit_state` that every
/// worker process contends for via `SELECT ... FOR UPDATE`. This makes the limiter correct across
/// a worker fleet at the cost of one round trip per acquisition attempt.
#[derive(Debug, Clone)]
pub struct PostgresGovernor {
    pool: PostgresPool,
    config: GovernorConfig,
}

impl PostgresGovernor {
    pub fn new(pool: PostgresPool, config: GovernorConfig) -> Self {
        Self { pool, config }
    }

    /// Single attempt to deduct `cost` tokens: locks the row, refills/resets it, then either
    /// deducts and commits or reports how long the caller should sleep before retrying.
    async fn try_once(&self, cost: Decimal) -> Result<AttemptOutcome, GovernorError> {
        let mut tx = self.pool.begin().await?;

        let mut state: RateLimitState = sqlx::query_as(
            "select key, tokens, last_refill, requests_this_minute, weight_this_minute, \
             minute_start, is_rate_limited, rate_limited_until \
             from rate_limit_state where key = $1 for update",
        )
        .bind(RATE_LIMIT_STATE_KEY)
        .fetch_one(&mut *tx)
        .await?;

        let now = OffsetDateTime::now_utc();
        refill(&mut state, now, &self.config);
        reset_minute_window_if_elapsed(&mut state, now);

        if state.is_rate_limited {
            if let Some(until) = state.rate_limited_until {
                if now < until {
                    persist(&mut tx, &state).await?;
                    tx.commit().await?;
                    let wait = (until - now).whole_milliseconds().max(0) as u64;
                    return Ok(AttemptOutcome::Wait { millis: wait });
                }
            }
            state.is_rate_limited = false;
            state.rate_limited_until = None;
        }

        if state.tokens < cost {
            let wait_secs = wait_secs_for(state.tokens, cost, self.config.refill_rate_per_sec);
            persist(&mut tx, &state).await?;
            tx.commit().await?;
            let millis = (wait_secs * Decimal::from(1000))
                .to_u64()
                .unwrap_or(1000)
                .max(1);
            return Ok(AttemptOutcome::Wait { millis });
        }

        state.tokens -= cost;
        state.requests_this_minute += 1;
        state.weight_this_minute += cost.to_i32().unwrap_or(0);
        persist(&mut tx, &state).await?;
        tx.commit().await?;

        Ok(AttemptOutcome::Acquired)
    }
}

enum AttemptOutcome {
    Acquired,
    Wait { millis: u64 },
}

fn refill(state: &mut RateLimitState, now: OffsetDateTime, config: &GovernorConfig) {
    let elapsed = (now - state.last_refill).as_seconds_f64().max(0.0);
    if elapsed <= 0.0 {
        return;
    }

    let refilled = config.refill_rate_per_sec * Decimal::try_from(elapsed).unwrap_or(Decimal::ZERO);
    state.tokens = (state.tokens + refilled).min(config.max_tokens);
    state.last_refill = now;
}

fn reset_minute_window_if_elapsed(state: &mut RateLimitState, now: OffsetDateTime) {
    if now - state.minute_start >= time::Duration::minutes(1) {
        state.minute_start = now;
        state.requests_this_minute = 0;
        state.weight_this_minute = 0;
    }
}

async fn persist(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    state: &RateLimitState,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "update rate_limit_state set tokens = $2, last_refill = $3, requests_this_minute = $4, \
         weight_this_minute = $5, minute_start = $6, is_rate_limited = $7, \
         rate_limited_until = $8 where key = $1",
    )
    .bind(&state.key)
    .bind(state.tokens)
    .bind(state.last_refill)
    .bind(state.requests_this_minute)
    .bind(state.weight_this_minute)
    .bind(state.minute_start)
    .bind(state.is_rate_limited)
    .bind(state.rate_limited_until)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

impl Governor for PostgresGovernor {
    #[trace]
    async fn acquire(&self, cost: Decimal) -> Result<u64, GovernorError> {
        let mut waited = 0u64;

        loop {
            match self.try_once(cost).await? {
                AttemptOutcome::Acquired => return Ok(waited),
                AttemptOutcome::Wait { millis } => {
                    debug!(millis; "governor: waiting for tokens to refill");
                    tokio::time::sleep(std::time::Duration::from_millis(millis)).await;
                    waited += millis;
                }
            }
        }
    }

    async fn try_acquire(&self, _cost: Decimal) -> Result<bool, GovernorError> {
        Err(GovernorError::TryAcquireUnsupported)
    }

    #[trace]
    async fn report_rate_limited(&self) -> Result<(), GovernorError> {
        warn!("governor: upstream reported rate limit, draining bucket");

        let mut tx = self.pool.begin().await?;

        let mut state: RateLimitState = sqlx::query_as(
            "select key, tokens, last_refill, requests_this_minute, weight_this_minute, \
             minute_start, is_rate_limited, rate_limited_until \
             from rate_limit_state where key = $1 for update",
        )
        .bind(RATE_LIMIT_STATE_KEY)
        .fetch_one(&mut *tx)
        .await?;

        let now = OffsetDateTime::now_utc();
        refill(&mut state, now, &self.config);

        state.tokens = Decimal::ZERO;
        state.is_rate_limited = true;
        state.rate_limited_until = Some(now + time::Duration::seconds(10));

        persist(&mut tx, &state).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn adjust_for_response(&self, items_returned: usize) -> Result<(), GovernorError> {
        let extra = response_adjustment(items_returned, self.config.default_cost);
        if extra == Decimal::ZERO {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "update rate_limit_state set tokens = greatest(tokens - $2, 0) where key = $1",
        )
        .bind(RATE_LIMIT_STATE_KEY)
        .bind(extra)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn available_requests(&self, cost: Decimal) -> Result<u64, GovernorError> {
        let state: RateLimitState = sqlx::query_as(
            "select key, tokens, last_refill, requests_this_minute, weight_this_minute, \
             minute_start, is_rate_limited, rate_limited_until \
             from rate_limit_state where key = $1",
        )
        .bind(RATE_LIMIT_STATE_KEY)
        .fetch_one(&*self.pool)
        .await?;

        if state.is_rate_limited {
            return Ok(0);
        }

        let now = OffsetDateTime::now_utc();
        let mut projected = state;
        refill(&mut projected, now, &self.config);

        if cost <= Decimal::ZERO {
            return Ok(0);
        }

        let available = (projected.tokens / cost).floor().to_u64().unwrap_or(0);
        Ok(available)
    }

    fn config(&self) -> &GovernorConfig {
        &self.config
    }
}
