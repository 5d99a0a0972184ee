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
use ingest_governor::{Governor, GovernorError, LocalGovernor, PostgresGovernor};
use rust_decimal::Decimal;

/// Picks between the distributed and process-local governor at startup, per the
/// `governor.use_distributed` config flag. Both variants implement `Governor` identically from
/// the caller's perspective.
#[derive(Debug, Clone)]
pub enum AnyGovernor {
    Distributed(PostgresGovernor),
    Local(LocalGovernor),
}

impl Governor for AnyGovernor {
    async fn acquire(&self, cost: Decimal) -> Result<u64, GovernorError> {
        match self {
            AnyGovernor::Distributed(g) => g.acquire(cost).await,
            AnyGovernor::Local(g) => g.acquire(cost).await,
        }
    }

    async fn try_acquire(&self, cost: Decimal) -> Result<bool, GovernorError> {
        match self {
            AnyGovernor::Distributed(g) => g.try_acquire(cost).await,
            AnyGovernor::Local(g) => g.try_acquire(cost).await,
        }
    }

    async fn report_rate_limited(&self) -> Result<(), GovernorError> {
        match self {
            AnyGovernor::Distributed(g) => g.report_rate_limited().await,
            AnyGovernor::Local(g) => g.report_rate_limited().await,
        }
    }

    async fn adjust_for_response(&self, items_returned: usize) -> Result<(), GovernorError> {
        match self {
            AnyGovernor::Distributed(g) => g.adjust_for_response(items_returned).await,
            AnyGovernor::Local(g) => g.adjust_for_response(items_returned).await,
        }
    }

    async fn available_requests(&self, cost: Decimal) -> Result<u64, GovernorError> {
        match self {
            AnyGovernor::Distributed(g) => g.available_requests(cost).await,
            AnyGovernor::Local(g) => g.available_requests(cost).await,
        }
    }

    fn config(&self) -> &GovernorConfig {
        match self {
            AnyGovernor::Distributed(g) => g.config(),
            AnyGovernor::Local(g) => g.config(),
        }
    }
}
