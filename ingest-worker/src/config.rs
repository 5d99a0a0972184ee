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

use ingest_common::config::{DatabaseConfig, LoggingConfig};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub governor: GovernorSettings,
    #[serde(default)]
    pub job_store: JobStoreSettings,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub fetcher: FetcherSettings,
    #[serde(default)]
    pub worker: WorkerSettings,
    pub org_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GovernorSettings {
    pub max_tokens: Decimal,
    pub refill_rate: Decimal,
    pub default_cost: Decimal,
    pub use_distributed: bool,
}

impl Default for GovernorSettings {
    fn default() -> Self {
        let defaults = ingest_common::domain::GovernorConfig::default();
        Self {
            max_tokens: defaults.max_tokens,
            refill_rate: defaults.refill_rate_per_sec,
            default_cost: defaults.default_cost,
            use_distributed: true,
        }
    }
}

impl GovernorSettings {
    pub fn as_governor_config(&self) -> ingest_common::domain::GovernorConfig {
        ingest_common::domain::GovernorConfig {
            max_tokens: self.max_tokens,
            refill_rate_per_sec: self.refill_rate,
            default_cost: self.default_cost,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct JobStoreSettings {
    pub default_lease_secs: i64,
    pub default_max_attempts: i32,
}

impl Default for JobStoreSettings {
    fn default() -> Self {
        Self {
            default_lease_secs: ingest_common::domain::DEFAULT_LEASE_SECS,
            default_max_attempts: ingest_common::domain::DEFAULT_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    #[serde(with = "humantime_serde")]
    pub tick_interval: Duration,
    pub max_jobs_per_run: i64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(5),
            max_jobs_per_run: 50,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct FetcherSettings {
    #[serde(with = "humantime_serde")]
    pub overlap_window: Duration,
    pub upstream_base_url: String,
    #[serde(with = "humantime_serde")]
    pub upstream_timeout: Duration,
}

impl Default for FetcherSettings {
    fn default() -> Self {
        Self {
            overlap_window: Duration::from_secs(600),
            upstream_base_url: "https://api.example-exchange.com/info".to_string(),
            upstream_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub id: Option<String>,
    pub concurrency_limit: Option<usize>,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            id: None,
            concurrency_limit: None,
        }
    }
}

impl WorkerSettings {
    /// `worker-<pid>` unless an explicit id was configured.
    pub fn resolved_id(&self) -> String {
        self.id.clone().unwrap_or_else(|| format!("worker-{}", std::process::id()))
    }

    /// Defaults to available parallelism, mirroring the pattern used elsewhere in this codebase
    /// for sizing concurrent task pools.
    pub fn resolved_concurrency_limit(&self) -> usize {
        self.concurrency_limit
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
    }
}

pub fn load(config_file: Option<&std::path::Path>) -> Result<Config, figment::Error> {
    ingest_common::config::load(config_file)
}
