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

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "ingest-worker", about = "Per-wallet fill ingestion worker")]
pub struct Cli {
    /// Optional YAML config file, merged over compiled-in defaults and under INGEST_ env vars.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the claim-and-dispatch loop and scheduler tick until shutdown. Default if omitted.
    Serve,
    /// Report job counts by status, including running jobs with expired leases.
    Monitor,
    /// Manually transition expired-lease running jobs back to queued.
    Recover,
    /// Unlink a wallet from the org and cancel its pending ingest jobs.
    UnregisterWallet {
        #[arg(long)]
        wallet_id: i64,
    },
}
