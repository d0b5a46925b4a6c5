// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Etherscan-compatible log API client.
//!
//! The poller deliberately goes through the explorer instead of
//! `eth_getLogs`: public RPC endpoints cap log ranges aggressively,
//! while explorers serve arbitrary ranges from their own index.

use std::time::Duration;

use crossfill_config::ExplorerConfig;
use crossfill_utils::{Error, Result};
use ethers::core::abi::RawLog;
use ethers::types::{Address, Bytes, H256};
use serde::Deserialize;

use crate::contracts::parse_quantity;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A client for the `module=logs&action=getLogs` explorer endpoint.
#[derive(Debug, Clone)]
pub struct ExplorerClient {
    http: reqwest::Client,
    api_url: url::Url,
    api_key: String,
}

/// One log entry as the explorer returns it. Quantities come back as
/// hex strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplorerLog {
    /// The emitting contract.
    pub address: Address,
    /// Event topics.
    pub topics: Vec<H256>,
    /// Non-indexed event data.
    pub data: Bytes,
    /// Block number, as a hex quantity string.
    pub block_number: String,
    /// Block timestamp, as a hex quantity string.
    pub time_stamp: String,
}

impl ExplorerLog {
    /// The log as an abi [`RawLog`], for event decoding.
    pub fn raw_log(&self) -> RawLog {
        RawLog {
            topics: self.topics.clone(),
            data: self.data.to_vec(),
        }
    }

    /// Parses the block number quantity.
    pub fn block_number(&self) -> Result<u64> {
        parse_quantity(&self.block_number)
    }
}

#[derive(Debug, Deserialize)]
struct ExplorerEnvelope {
    status: String,
    message: String,
    result: serde_json::Value,
}

impl ExplorerClient {
    /// Creates a client from a chain's explorer configuration.
    pub fn new(config: &ExplorerConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            api_url: config.api_url.as_url().clone(),
            api_key: (*config.api_key).clone(),
        })
    }

    /// Fetches all logs of `topic0` emitted by `address` from
    /// `from_block` to the chain head.
    pub async fn get_logs(
        &self,
        address: Address,
        topic0: H256,
        from_block: u64,
    ) -> Result<Vec<ExplorerLog>> {
        let query = [
            ("module", "logs".to_string()),
            ("action", "getLogs".to_string()),
            ("address", format!("{address:?}")),
            ("topic0", format!("{topic0:?}")),
            ("fromBlock", from_block.to_string()),
            ("toBlock", "latest".to_string()),
            ("apikey", self.api_key.clone()),
        ];
        self.fetch(&query).await
    }

    /// Fetches logs further filtered by their first indexed parameter.
    pub async fn get_logs_by_topic1(
        &self,
        address: Address,
        topic0: H256,
        topic1: H256,
        from_block: u64,
    ) -> Result<Vec<ExplorerLog>> {
        let query = [
            ("module", "logs".to_string()),
            ("action", "getLogs".to_string()),
            ("address", format!("{address:?}")),
            ("topic0", format!("{topic0:?}")),
            ("topic1", format!("{topic1:?}")),
            ("topic0_1_opr", "and".to_string()),
            ("fromBlock", from_block.to_string()),
            ("toBlock", "latest".to_string()),
            ("apikey", self.api_key.clone()),
        ];
        self.fetch(&query).await
    }

    async fn fetch(
        &self,
        query: &[(&str, String)],
    ) -> Result<Vec<ExplorerLog>> {
        let response = self
            .http
            .get(self.api_url.clone())
            .query(query)
            .send()
            .await?;
        let envelope: ExplorerEnvelope = response.json().await?;
        // The explorer reports an empty result set as a failure status
        // with a "No records found" message.
        if envelope.status != "1" {
            if envelope.message.contains("No records found") {
                return Ok(Vec::new());
            }
            let detail = envelope
                .result
                .as_str()
                .unwrap_or(&envelope.message)
                .to_string();
            return Err(Error::ExplorerApi { message: detail });
        }
        let logs = serde_json::from_value(envelope.result)?;
        Ok(logs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explorer_log_deserializes_and_parses_quantities() {
        let json = r#"{
            "address": "0x3fca2cce3ff44bb0c32f55be8a3ad12a2b26f521",
            "topics": [
                "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
                "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb"
            ],
            "data": "0xcafe",
            "blockNumber": "0x10",
            "timeStamp": "0x64e5f3c0",
            "gasPrice": "0x0",
            "logIndex": "0x1"
        }"#;
        let log: ExplorerLog = serde_json::from_str(json).unwrap();
        assert_eq!(log.block_number().unwrap(), 16);
        assert_eq!(log.topics.len(), 2);
        let raw = log.raw_log();
        assert_eq!(raw.data, vec![0xca, 0xfe]);
    }
}
