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

#![warn(missing_docs)]

//! # Crossfill Configuration Module 🕸️
//!
//! A module for configuring the filler.
//!
//! ## Overview
//!
//! The configuration is a map of chains: every chain the filler knows
//! about gets one entry describing its RPC endpoint, the protocol
//! contracts deployed on it, which proof scheme verifies its state on
//! L1, and the knobs of the outbox poller. Chains are keyed by a free
//! name in the files and re-keyed by chain id after loading.

/// CLI configuration
#[cfg(feature = "cli")]
pub mod cli;
/// Utils for processing configuration
pub mod utils;

use std::collections::HashMap;

use crossfill_types::explorer_api::ExplorerApiKey;
use crossfill_types::private_key::PrivateKey;
use crossfill_types::rpc_url::RpcUrl;
use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};

/// The poll interval of the outbox indexer, `3_000` ms by default.
const fn poll_interval_ms_default() -> u64 {
    3_000
}
/// The tick interval of the reward monitor, `60_000` ms by default.
const fn claim_interval_ms_default() -> u64 {
    60_000
}
/// The tick interval of the sponsor monitor, `3_000` ms by default.
const fn sponsor_interval_ms_default() -> u64 {
    3_000
}
/// Chains are enabled by default; disabled entries are dropped after
/// loading.
const fn enabled_default() -> bool {
    true
}
const fn exposes_l1_state_default() -> bool {
    true
}
const fn shares_state_with_l1_default() -> bool {
    true
}

/// Base slot of the inbox's fulfillment info mapping.
fn fulfillment_info_slot_default() -> H256 {
    "0x43f1016e17bdb0194ec37b77cf476d255de00011d02616ab831d2e2ce63d9ee2"
        .parse()
        .expect("valid slot constant")
}

/// CrossfillConfig is the configuration for the crossfill filler.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct CrossfillConfig {
    /// EVM based networks and the configuration.
    ///
    /// a map between chain name and its configuration.
    #[serde(default)]
    pub evm: HashMap<String, ChainConfig>,
}

impl CrossfillConfig {
    /// Looks up a chain entry by its chain id. Assumes the config went
    /// through [`utils::postloading_process`], which re-keys the map.
    pub fn chain(&self, chain_id: u64) -> crossfill_utils::Result<&ChainConfig> {
        self.evm.get(&chain_id.to_string()).ok_or(
            crossfill_utils::Error::ChainNotFound {
                chain_id: chain_id.to_string(),
            },
        )
    }

    /// Makes sure that the config is valid, by going through the whole
    /// config and doing some basic checks: every enabled chain we are
    /// expected to send transactions on must carry a private key.
    pub fn verify(&self) -> crossfill_utils::Result<()> {
        self.evm
            .values()
            .filter(|c| c.enabled)
            .all(|c| c.private_key.is_some())
            .then_some(())
            .ok_or(crossfill_utils::Error::MissingSecrets)
    }
}

/// The proof scheme that verifies a chain's state on L1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", tag = "family")]
pub enum ProverFamily {
    /// Rollup with confirmed assertions posted to a registry
    /// (Arbitrum style).
    #[serde(rename_all = "kebab-case")]
    RollupAssertion {
        /// How the confirmed assertion maps to a storage slot.
        #[serde(default)]
        slot_mode: AssertionSlotMode,
    },
    /// Rollup with anchored output roots (OP stack style).
    OutputRoot,
    /// No shared L1 state; a pushed block hash oracle bridges the two
    /// chains.
    HashOracle,
}

/// Storage layout used by the assertion registry.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum AssertionSlotMode {
    /// Legacy registries key confirm data by node index.
    #[default]
    NodeIndex,
    /// Newer registries key assertions by their hash.
    AssertionHash,
}

/// Addresses of the protocol contracts deployed on (or known to) a
/// chain.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ContractsConfig {
    /// The outbox requests are posted through, when this chain acts as
    /// a source.
    #[serde(default)]
    pub outbox: Option<Address>,
    /// The inbox executing calls, when this chain acts as a
    /// destination.
    #[serde(default)]
    pub inbox: Option<Address>,
    /// The 4337 entry point, for user operation requests.
    #[serde(default)]
    pub entry_point: Option<Address>,
    /// The L1 contract that settles this chain's state (assertion
    /// registry or anchor state registry).
    #[serde(default)]
    pub l2_oracle: Option<Address>,
    /// The message passer predeploy, for output-root chains.
    #[serde(default)]
    pub message_passer: Option<Address>,
}

/// Outbox poller knobs for a source chain.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct IndexerConfig {
    /// The block the poller starts from on first run.
    #[serde(default)]
    pub start_block: u64,
    /// Milliseconds between poll ticks.
    #[serde(default = "poll_interval_ms_default")]
    pub poll_interval_ms: u64,
    /// Milliseconds between reward monitor ticks.
    #[serde(default = "claim_interval_ms_default")]
    pub claim_interval_ms: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            start_block: 0,
            poll_interval_ms: poll_interval_ms_default(),
            claim_interval_ms: claim_interval_ms_default(),
        }
    }
}

/// Balance floors the sponsor monitor keeps funded on a destination
/// chain.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SponsorshipConfig {
    /// Wei floor of the inbox's gas deposit on the entry point. Zero
    /// disables the gas top-up.
    #[serde(default)]
    pub entry_point_threshold: U256,
    /// Wei floor of the fulfiller's magic spend balance on the inbox.
    /// Zero disables the magic spend top-up.
    #[serde(default)]
    pub magic_spend_threshold: U256,
    /// Milliseconds between balance checks.
    #[serde(default = "sponsor_interval_ms_default")]
    pub poll_interval_ms: u64,
}

/// Explorer (etherscan-compatible) log API access for a chain.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ExplorerConfig {
    /// Base url of the API, e.g. `https://api-sepolia.etherscan.io/api`.
    pub api_url: RpcUrl,
    /// A wrapper type around the `String` to allow reading it from the env.
    #[serde(skip_serializing)]
    pub api_key: ExplorerApiKey,
}

/// ChainConfig is the configuration of a single chain.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChainConfig {
    /// Human readable chain name, only used in logs.
    pub name: String,
    /// The chain id.
    pub chain_id: u64,
    /// Whether the filler should act on this chain at all.
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    /// Http(s) RPC endpoint.
    pub http_endpoint: RpcUrl,
    /// The private key used to sign transactions on this chain.
    #[serde(skip_serializing)]
    pub private_key: Option<PrivateKey>,
    /// Explorer log API access, required on chains we index.
    #[serde(default)]
    pub explorer: Option<ExplorerConfig>,
    /// Consensus-layer REST endpoint of the chain's L1, required on
    /// chains that expose L1 state.
    #[serde(default)]
    pub beacon_api_url: Option<RpcUrl>,
    /// The proof scheme verifying this chain's state on L1.
    pub prover_family: ProverFamily,
    /// Chain id of the L1 this chain settles to, when it is not the
    /// source chain itself.
    #[serde(default)]
    pub l1_chain_id: Option<u64>,
    /// Whether this chain exposes its L1's beacon roots.
    #[serde(default = "exposes_l1_state_default")]
    pub exposes_l1_state: bool,
    /// Whether this chain settles its state to the same L1.
    #[serde(default = "shares_state_with_l1_default")]
    pub shares_state_with_l1: bool,
    /// Devnet chains skip the consensus API and use a mocked beacon
    /// witness.
    #[serde(default)]
    pub devnet: bool,
    /// Protocol contract addresses.
    #[serde(default)]
    pub contracts: ContractsConfig,
    /// The storage key (or mapping base slot) of the l2 oracle entry
    /// this chain's proofs read.
    #[serde(default)]
    pub l2_oracle_storage_key: Option<H256>,
    /// Base slot of the inbox's fulfillment info mapping.
    #[serde(default = "fulfillment_info_slot_default")]
    pub fulfillment_info_slot: H256,
    /// Outbox poller knobs.
    #[serde(default)]
    pub indexer: IndexerConfig,
    /// Paymaster balance floors, on destination chains sponsoring user
    /// operations.
    #[serde(default)]
    pub sponsorship: Option<SponsorshipConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prover_family_parses_from_kebab_case() {
        let json =
            r#"{ "family": "rollup-assertion", "slot-mode": "assertion-hash" }"#;
        let family: ProverFamily = serde_json::from_str(json).unwrap();
        assert_eq!(
            family,
            ProverFamily::RollupAssertion {
                slot_mode: AssertionSlotMode::AssertionHash
            }
        );
    }

    #[test]
    fn sponsorship_thresholds_parse_with_a_default_interval() {
        let json = r#"{
            "entry-point-threshold": "0xde0b6b3a7640000",
            "magic-spend-threshold": "0x6f05b59d3b20000"
        }"#;
        let sponsorship: SponsorshipConfig =
            serde_json::from_str(json).unwrap();
        assert_eq!(
            sponsorship.entry_point_threshold,
            U256::from(1_000_000_000_000_000_000u64)
        );
        assert_eq!(
            sponsorship.magic_spend_threshold,
            U256::from(500_000_000_000_000_000u64)
        );
        assert_eq!(sponsorship.poll_interval_ms, 3_000);
    }

    #[test]
    fn default_slot_mode_is_node_index() {
        let json = r#"{ "family": "rollup-assertion" }"#;
        let family: ProverFamily = serde_json::from_str(json).unwrap();
        assert_eq!(
            family,
            ProverFamily::RollupAssertion {
                slot_mode: AssertionSlotMode::NodeIndex
            }
        );
    }
}
