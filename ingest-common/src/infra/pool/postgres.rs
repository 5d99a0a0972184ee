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

use crate::config::DatabaseConfig;
use secrecy::ExposeSecret;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::ops::Deref;

/// A cloneable handle to the shared Postgres connection pool. `Clone` is cheap: it clones an
/// internal `Arc`, the same pool is shared by every component in the process.
#[derive(Debug, Clone)]
pub struct PostgresPool(PgPool);

impl PostgresPool {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(config.url.expose_secret())
            .await?;

        Ok(Self(pool))
    }

    /// Wrap an already-constructed pool, e.g. one created by a test harness.
    pub fn from_pool(pool: PgPool) -> Self {
        Self(pool)
    }
}

impl Deref for PostgresPool {
    type Target = PgPool;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
