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

use std::sync::Arc;

use ingest_common::domain::rate_limit::GovernorConfig;
use log::warn;
use parking_lot::Mutex;
use rust_decimal::{prelude::ToPrimitive, Decimal};
use time::OffsetDateTime;

use crate::domain::{response_adjustment, wait_secs_for, Governor, GovernorError};

#[derive(Debug)]
struct State {
    tokens: Decimal,
    last_refill: OffsetDateTime,
    is_rate_limited: bool,
    rate_limited_until: Option<OffsetDateTime>,
}

/// Process-local governor for single-worker deployments, where the round trip to Postgres that
/// `PostgresGovernor` pays on every acquisition is pure overhead. Guarded by a `parking_lot`
/// mutex rather than an async lock: critical sections are pure arithmetic, never an await point.
#[derive(Debug, Clone)]
pub struct LocalGovernor {
    state: Arc<Mutex<State>>,
    config: GovernorConfig,
}

impl LocalGovernor {
    pub fn new(config: GovernorConfig) -> Self {
        let state = State {
            tokens: config.max_tokens,
            last_refill: OffsetDateTime::now_utc(),
            is_rate_limited: false,
            rate_limited_until: None,
        };

        Self {
            state: Arc::new(Mutex::new(state)),
            config,
        }
    }

    fn refill_locked(&self, state: &mut State, now: OffsetDateTime) {
        let elapsed = (now - state.last_refill).as_seconds_f64().max(0.0);
        if elapsed <= 0.0 {
            return;
        }

        let refilled =
            self.config.refill_rate_per_sec * Decimal::try_from(elapsed).unwrap_or(Decimal::ZERO);
        state.tokens = (state.tokens + refilled).min(self.config.max_tokens);
        state.last_refill = now;
    }

    /// Returns `Some(wait_millis)` if the caller must wait, `None` if `cost` tokens were just
    /// deducted.
    fn attempt(&self, cost: Decimal) -> Option<u64> {
        let mut state = self.state.lock();
        let now = OffsetDateTime::now_utc();
        self.refill_locked(&mut state, now);

        if state.is_rate_limited {
            if let Some(until) = state.rate_limited_until {
                if now < until {
                    return Some((until - now).whole_milliseconds().max(1) as u64);
                }
            }
            state.is_rate_limited = false;
            state.rate_limited_until = None;
        }

        if state.tokens < cost {
            let wait_secs = wait_secs_for(state.tokens, cost, self.config.refill_rate_per_sec);
            let millis = (wait_secs * Decimal::from(1000)).to_u64().unwrap_or(1000).max(1);
            return Some(millis);
        }

        state.tokens -= cost;
        None
    }
}

impl Governor for LocalGovernor {
    async fn acquire(&self, cost: Decimal) -> Result<u64, GovernorError> {
        let mut waited = 0u64;

        loop {
            match self.attempt(cost) {
                None => return Ok(waited),
                Some(millis) => {
                    tokio::time::sleep(std::time::Duration::from_millis(millis)).await;
                    waited += millis;
                }
            }
        }
    }

    async fn try_acquire(&self, cost: Decimal) -> Result<bool, GovernorError> {
        let mut state = self.state.lock();
        let now = OffsetDateTime::now_utc();
        self.refill_locked(&mut state, now);

        if state.is_rate_limited {
            if let Some(until) = state.rate_limited_until {
                if now < until {
                    return Ok(false);
                }
            }
            state.is_rate_limited = false;
            state.rate_limited_until = None;
        }

        if state.tokens < cost {
            return Ok(false);
        }

        state.tokens -= cost;
        Ok(true)
    }

    async fn report_rate_limited(&self) -> Result<(), GovernorError> {
        warn!("governor: upstream reported rate limit, draining bucket");
        let mut state = self.state.lock();
        let now = OffsetDateTime::now_utc();
        self.refill_locked(&mut state, now);

        state.tokens = Decimal::ZERO;
        state.is_rate_limited = true;
        state.rate_limited_until = Some(now + time::Duration::seconds(10));
        Ok(())
    }

    async fn adjust_for_response(&self, items_returned: usize) -> Result<(), GovernorError> {
        let extra = response_adjustment(items_returned, self.config.default_cost);
        let mut state = self.state.lock();
        state.tokens = (state.tokens - extra).max(Decimal::ZERO);
        Ok(())
    }

    async fn available_requests(&self, cost: Decimal) -> Result<u64, GovernorError> {
        if cost <= Decimal::ZERO {
            return Ok(0);
        }

        let mut state = self.state.lock();
        let now = OffsetDateTime::now_utc();
        self.refill_locked(&mut state, now);

        if state.is_rate_limited {
            return Ok(0);
        }

        Ok((state.tokens / cost).floor().to_u64().unwrap_or(0))
    }

    fn config(&self) -> &GovernorConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn config() -> GovernorConfig {
        GovernorConfig {
            max_tokens: dec!(100),
            refill_rate_per_sec: dec!(0.67),
            default_cost: dec!(20),
        }
    }

    #[tokio::test]
    async fn try_acquire_succeeds_while_tokens_remain() {
        let governor = LocalGovernor::new(config());

        for _ in 0..5 {
            assert!(governor.try_acquire(dec!(20)).await.unwrap());
        }

        // Burst of 100 tokens at cost 20 grants exactly 5 immediate acquisitions.
        assert!(!governor.try_acquire(dec!(20)).await.unwrap());
    }

    #[tokio::test]
    async fn report_rate_limited_blocks_further_acquisition() {
        let governor = LocalGovernor::new(config());
        governor.report_rate_limited().await.unwrap();

        assert!(!governor.try_acquire(dec!(1)).await.unwrap());
    }

    #[tokio::test]
    async fn available_requests_reflects_burst_capacity() {
        let governor = LocalGovernor::new(config());
        assert_eq!(governor.available_requests(dec!(20)).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn adjust_for_response_debits_extra_weight() {
        let governor = LocalGovernor::new(config());
        governor.adjust_for_response(45).await.unwrap();

        // 45 items costs 2 more than the flat default, leaving 98 tokens.
        assert_eq!(governor.available_requests(dec!(1)).await.unwrap(), 98);
    }
}
