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

use crate::domain::wallet::{WalletAddress, WalletId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

/// The kind of work a job performs. Stored redundantly alongside the payload so the Job Store
/// can filter/order by type without decoding the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_type", rename_all = "snake_case")]
pub enum JobType {
    IngestWallet,
    RollupWalletDay,
    RollupGlobalDay,
}

/// The lifecycle state of a job. `Succeeded`, `Failed` and `Canceled` are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

/// Strongly-typed job payloads. The Job Store persists and returns these as JSON; handler
/// dispatch decodes the variant matching the job's `JobType` so there is no stringly-typed
/// intermediate representation in application code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobPayload {
    IngestWallet {
        org_id: Uuid,
        wallet_id: WalletId,
        address: WalletAddress,
    },
    RollupWalletDay {
        org_id: Uuid,
        wallet_id: WalletId,
        days: Vec<Date>,
    },
    RollupGlobalDay {
        org_id: Uuid,
        days: Vec<Date>,
    },
}

impl JobPayload {
    pub fn job_type(&self) -> JobType {
        match self {
            JobPayload::IngestWallet { .. } => JobType::IngestWallet,
            JobPayload::RollupWalletDay { .. } => JobType::RollupWalletDay,
            JobPayload::RollupGlobalDay { .. } => JobType::RollupGlobalDay,
        }
    }

    pub fn org_id(&self) -> Uuid {
        match self {
            JobPayload::IngestWallet { org_id, .. }
            | JobPayload::RollupWalletDay { org_id, .. }
            | JobPayload::RollupGlobalDay { org_id, .. } => *org_id,
        }
    }
}

#[derive(Debug, Error)]
#[error("cannot decode job payload: {0}")]
pub struct DecodePayloadError(#[from] serde_json::Error);

/// A durable unit of work. `attempts` is incremented by `Claim`, never by the handler.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Job {
    pub id: Uuid,
    pub org_id: Uuid,
    pub job_type: JobType,
    pub payload: serde_json::Value,
    pub run_at: OffsetDateTime,
    pub status: JobStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub locked_by: Option<String>,
    pub locked_at: Option<OffsetDateTime>,
    pub lock_expires_at: Option<OffsetDateTime>,
    pub last_error: Option<String>,
}

impl Job {
    /// Decode this job's stored payload into the strongly-typed [`JobPayload`].
    pub fn payload(&self) -> Result<JobPayload, DecodePayloadError> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

pub const DEFAULT_MAX_ATTEMPTS: i32 = 10;
pub const DEFAULT_LEASE_SECS: i64 = 300;
