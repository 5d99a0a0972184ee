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

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use secrecy::SecretString;
use serde::{Deserialize, de::DeserializeOwned};
use std::path::Path;

/// Load a layered configuration: field-level `#[serde(default = ...)]` values, overridden by an
/// optional YAML file, overridden by environment variables prefixed `INGEST_`
/// (double-underscore-separated for nesting, e.g. `INGEST_DATABASE__MAX_CONNECTIONS`).
pub fn load<T>(config_file: Option<&Path>) -> Result<T, figment::Error>
where
    T: DeserializeOwned,
{
    let mut figment = Figment::new();

    if let Some(path) = config_file {
        figment = figment.merge(Yaml::file(path));
    }

    figment.merge(Env::prefixed("INGEST_").split("__")).extract()
}

/// Database connection settings, shared by every binary that opens a pool.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: SecretString,
    #[serde(default = "DatabaseConfig::default_max_connections")]
    pub max_connections: u32,
}

impl DatabaseConfig {
    fn default_max_connections() -> u32 {
        10
    }
}

/// Structured logging settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}
