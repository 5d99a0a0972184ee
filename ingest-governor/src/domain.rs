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

use ingest_common::domain::GovernorConfig;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GovernorError {
    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error("try_acquire is not supported by the distributed governor")]
    TryAcquireUnsupported,
}

/// Rate-limit governor shared by every worker: all upstream calls pass through `acquire` before
/// being issued. A single implementation is constructed once per process and shared, per the
/// "init -> serve, never reinitialized" lifecycle in the design notes.
#[trait_variant::make(Send)]
pub trait Governor
where
    Self: Clone + Send + Sync + 'static,
{
    /// Block until `cost` tokens are available, then deduct them. Returns the accumulated wait
    /// in milliseconds. Never consumes tokens while `is_rate_limited` is still in effect.
    async fn acquire(&self, cost: Decimal) -> Result<u64, GovernorError>;

    /// Non-blocking variant of `acquire`. Always unsupported when the governor is backed by
    /// shared, cross-worker state; only the process-local fallback implements it.
    async fn try_acquire(&self, cost: Decimal) -> Result<bool, GovernorError>;

    /// Record that the upstream rejected the last call with a rate-limit error: drains the
    /// bucket and blocks further acquisition for 10 seconds.
    async fn report_rate_limited(&self) -> Result<(), GovernorError>;

    /// Post-hoc adjustment for the upstream's response-weighted pricing: debits
    /// `max(0, (20 + items/20) - default_cost)` beyond what `acquire` already charged.
    async fn adjust_for_response(&self, items_returned: usize) -> Result<(), GovernorError>;

    /// Estimate how many `cost`-sized acquires could succeed right now, without mutating state.
    async fn available_requests(&self, cost: Decimal) -> Result<u64, GovernorError>;

    fn config(&self) -> &GovernorConfig;
}

/// Given the current token count and config, the wait (in whole seconds, rounded up) before
/// `cost` tokens become available through refill alone.
pub fn wait_secs_for(tokens: Decimal, cost: Decimal, refill_rate_per_sec: Decimal) -> Decimal {
    if tokens >= cost || refill_rate_per_sec <= Decimal::ZERO {
        return Decimal::ZERO;
    }

    let deficit = cost - tokens;
    (deficit / refill_rate_per_sec).ceil()
}

/// The post-hoc debit modeling the upstream's response-weighted pricing: `max(0, (20 +
/// items/20) - default_cost)`.
pub fn response_adjustment(items_returned: usize, default_cost: Decimal) -> Decimal {
    let modeled_cost = Decimal::from(20 + items_returned / 20);
    (modeled_cost - default_cost).max(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn wait_is_zero_when_tokens_suffice() {
        assert_eq!(wait_secs_for(dec!(50), dec!(20), dec!(0.67)), Decimal::ZERO);
    }

    #[test]
    fn wait_rounds_up_to_whole_seconds() {
        // Deficit of 1 token at 0.67/s refill is 1.49s, rounds up to 2.
        let wait = wait_secs_for(dec!(19), dec!(20), dec!(0.67));
        assert_eq!(wait, dec!(2));
    }

    #[test]
    fn response_adjustment_matches_upstream_weight_formula() {
        // 0 items: modeled cost 20, default cost 20 => 0.
        assert_eq!(response_adjustment(0, dec!(20)), Decimal::ZERO);
        // 45 items: modeled cost 20 + 45/20 = 22, minus default 20 => 2.
        assert_eq!(response_adjustment(45, dec!(20)), dec!(2));
    }

    #[test]
    fn response_adjustment_never_negative() {
        assert_eq!(response_adjustment(0, dec!(50)), Decimal::ZERO);
    }
}
