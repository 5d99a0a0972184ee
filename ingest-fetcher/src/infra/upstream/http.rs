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

use std::time::Duration;

use ingest_common::domain::WalletAddress;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::domain::{Upstream, UpstreamError, UpstreamFill};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// `reqwest`-based implementation of the upstream `FetchFills` contract: a single `POST` to the
/// info endpoint with a `userFillsByTime` request body.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: Client,
    base_url: String,
}

impl HttpUpstream {
    pub fn new(base_url: String) -> Result<Self, reqwest::Error> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: String, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }
}

#[derive(Debug, serde::Serialize)]
struct UserFillsByTimeRequest<'a> {
    #[serde(rename = "type")]
    request_type: &'static str,
    user: &'a str,
    #[serde(rename = "startTime")]
    start_time: i64,
}

#[derive(Debug, Deserialize)]
struct RawFill {
    time: i64,
    coin: String,
    side: String,
    px: String,
    sz: String,
    hash: String,
    tid: u64,
}

impl Upstream for HttpUpstream {
    async fn fetch_fills(
        &self,
        address: &WalletAddress,
        start_millis: i64,
    ) -> Result<Vec<UpstreamFill>, UpstreamError> {
        let clamped_start = start_millis.max(0);

        let body = UserFillsByTimeRequest {
            request_type: "userFillsByTime",
            user: address.as_ref(),
            start_time: clamped_start,
        };

        let response = self
            .client
            .post(&self.base_url)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|error| UpstreamError::Transient(error.to_string()))?;

        if !status.is_success() {
            if is_rate_limit_message(&text) {
                return Err(UpstreamError::RateLimited);
            }

            if status.is_server_error() {
                return Err(UpstreamError::Transient(format!("status {status}: {text}")));
            }

            return Err(UpstreamError::Malformed(format!("status {status}: {text}")));
        }

        let raw_fills: Vec<RawFill> = serde_json::from_str(&text)
            .map_err(|error| UpstreamError::Malformed(error.to_string()))?;

        raw_fills.into_iter().map(parse_fill).collect()
    }
}

fn classify_transport_error(error: reqwest::Error) -> UpstreamError {
    if error.is_timeout() || error.is_connect() {
        UpstreamError::Transient(error.to_string())
    } else {
        UpstreamError::Malformed(error.to_string())
    }
}

fn is_rate_limit_message(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    lower.contains("rate limit") || lower.contains("too many")
}

fn parse_fill(raw: RawFill) -> Result<UpstreamFill, UpstreamError> {
    let px: Decimal = raw
        .px
        .parse()
        .map_err(|_| UpstreamError::Malformed(format!("unparseable px {:?}", raw.px)))?;
    let sz: Decimal = raw
        .sz
        .parse()
        .map_err(|_| UpstreamError::Malformed(format!("unparseable sz {:?}", raw.sz)))?;

    let ts = time::OffsetDateTime::from_unix_timestamp_nanos(raw.time as i128 * 1_000_000)
        .map_err(|_| UpstreamError::Malformed(format!("unparseable time {}", raw.time)))?;

    Ok(UpstreamFill {
        tid: raw.tid,
        hash: raw.hash,
        ts,
        coin: raw.coin,
        side: raw.side,
        px,
        sz,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_rate_limit_phrasing() {
        assert!(is_rate_limit_message("Error: rate limit exceeded"));
        assert!(is_rate_limit_message("too many requests"));
        assert!(!is_rate_limit_message("internal server error"));
    }

    #[test]
    fn parse_fill_rejects_malformed_px() {
        let raw = RawFill {
            time: 0,
            coin: "ETH".into(),
            side: "A".into(),
            px: "not-a-number".into(),
            sz: "1".into(),
            hash: "abc".into(),
            tid: 1,
        };

        assert!(parse_fill(raw).is_err());
    }
}
