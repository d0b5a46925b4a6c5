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

//! Execution-layer clients and the cross-chain reads the prover needs.

use std::sync::Arc;

use crossfill_config::{ChainConfig, ProverFamily};
use crossfill_utils::{Error, Result};
use ethers::contract::EthLogDecode;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{
    Address, Block, BlockId, BlockNumber, EIP1186ProofResponse, H256, U256,
};

use crate::contracts::{
    assertion_after_state, AnchorStateRegistry, AssertionState, Inbox,
    NodeCreatedFilter, RollupRegistry,
};
use crate::explorer::ExplorerClient;

/// A single chain: its configuration plus a shared http provider.
#[derive(Debug, Clone)]
pub struct ChainClient {
    /// The chain's configuration entry.
    pub config: ChainConfig,
    provider: Arc<Provider<Http>>,
}

impl ChainClient {
    /// Creates a client from a chain's configuration entry.
    pub fn new(config: ChainConfig) -> Result<Self> {
        let provider = Provider::<Http>::try_from(
            config.http_endpoint.to_string(),
        )?;
        Ok(Self {
            config,
            provider: Arc::new(provider),
        })
    }

    /// The shared provider handle.
    pub fn provider(&self) -> Arc<Provider<Http>> {
        self.provider.clone()
    }

    /// The chain id, straight from the configuration.
    pub fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    /// Builds the signing wallet for this chain.
    pub fn wallet(&self) -> Result<LocalWallet> {
        let key = self
            .config
            .private_key
            .as_ref()
            .ok_or(Error::MissingSecrets)?;
        let wallet = LocalWallet::from_bytes(key.as_bytes())?
            .with_chain_id(self.config.chain_id);
        Ok(wallet)
    }

    /// Builds the explorer log client for this chain.
    pub fn explorer(&self) -> Result<ExplorerClient> {
        let config = self.config.explorer.as_ref().ok_or_else(|| {
            Error::ExplorerConfigNotFound {
                chain_id: self.config.chain_id.to_string(),
            }
        })?;
        ExplorerClient::new(config)
    }

    /// The latest block of the chain.
    pub async fn latest_block(&self) -> Result<Block<H256>> {
        self.block(BlockId::Number(BlockNumber::Latest)).await
    }

    /// The latest finalized block of the chain.
    pub async fn finalized_block(&self) -> Result<Block<H256>> {
        self.block(BlockId::Number(BlockNumber::Finalized)).await
    }

    /// Fetches a block, treating "not found" as an error.
    pub async fn block(&self, id: BlockId) -> Result<Block<H256>> {
        self.provider
            .get_block(id)
            .await?
            .ok_or(Error::Generic("block not found"))
    }

    /// An EIP-1186 account and storage proof at the given block.
    pub async fn get_proof(
        &self,
        address: Address,
        slots: Vec<H256>,
        block: BlockId,
    ) -> Result<EIP1186ProofResponse> {
        let proof = self
            .provider
            .get_proof(address, slots, Some(block))
            .await?;
        Ok(proof)
    }

    /// Reads the inbox's fulfillment record for a request hash. A zero
    /// timestamp means the request has not been fulfilled.
    pub async fn fulfillment_info(
        &self,
        request_hash: H256,
    ) -> Result<(u128, Address)> {
        let inbox_address = self
            .config
            .contracts
            .inbox
            .ok_or(Error::Generic("no inbox configured"))?;
        let inbox = Inbox::new(inbox_address, self.provider());
        let (timestamp, fulfiller) =
            inbox.get_fulfillment_info(request_hash.0).call().await?;
        Ok((timestamp, fulfiller))
    }
}

/// A rollup assertion confirmed on L1, resolved back to the event that
/// created it.
#[derive(Debug, Clone)]
pub struct ConfirmedAssertion {
    /// The confirmed node index in the registry.
    pub node_index: u64,
    /// The node hash, for registries keyed by assertion hash.
    pub node_hash: H256,
    /// Hash of the parent node, part of the assertion hash preimage.
    pub parent_node_hash: H256,
    /// The inbox batch accumulator after this assertion.
    pub after_inbox_batch_acc: H256,
    /// The after-state the assertion commits to.
    pub state: AssertionState,
}

/// The destination block a proof can be built against, together with
/// the settlement data that pinned it.
#[derive(Debug, Clone)]
pub struct SettledBlock {
    /// The destination chain block.
    pub block: Block<H256>,
    /// The confirmed assertion, on rollup-assertion destinations.
    pub assertion: Option<ConfirmedAssertion>,
}

/// The chains a single request touches: the source it was posted on,
/// the destination it executes on, and the L1 the destination settles
/// to when that is a third chain.
#[derive(Debug, Clone)]
pub struct ActiveChains {
    /// Where the request was posted.
    pub src: ChainClient,
    /// Where the calls execute.
    pub dst: ChainClient,
    /// The destination's settlement layer, when distinct from `src`.
    pub l1: Option<ChainClient>,
}

impl ActiveChains {
    /// The destination's settlement layer. Falls back to the source
    /// chain, which is the common case of an L1 source.
    pub fn l1(&self) -> &ChainClient {
        self.l1.as_ref().unwrap_or(&self.src)
    }

    /// The beacon root and timestamp the source chain currently
    /// exposes, read off its latest execution block.
    pub async fn exposed_beacon_root(&self) -> Result<(H256, U256)> {
        let block = self.src.latest_block().await?;
        let root = block
            .parent_beacon_block_root
            .ok_or(Error::Generic("source block carries no beacon root"))?;
        Ok((root, block.timestamp))
    }

    /// Resolves the latest destination block whose state is settled on
    /// L1 as of `l1_block_number`, per the destination's proof scheme.
    pub async fn settled_destination_block(
        &self,
        l1_block_number: u64,
    ) -> Result<SettledBlock> {
        match self.dst.config.prover_family {
            ProverFamily::RollupAssertion { .. } => {
                let assertion =
                    self.confirmed_assertion(l1_block_number).await?;
                let block = self
                    .dst
                    .block(BlockId::Hash(assertion.state.block_hash()))
                    .await?;
                Ok(SettledBlock {
                    block,
                    assertion: Some(assertion),
                })
            }
            ProverFamily::OutputRoot => {
                let registry_address = self.oracle_address()?;
                let registry = AnchorStateRegistry::new(
                    registry_address,
                    self.l1().provider(),
                );
                let (_root, l2_block_number) = registry
                    .anchors(U256::zero())
                    .block(l1_block_number)
                    .call()
                    .await?;
                let block = self
                    .dst
                    .block(BlockId::Number(l2_block_number.as_u64().into()))
                    .await?;
                Ok(SettledBlock {
                    block,
                    assertion: None,
                })
            }
            // No settlement to wait for, the oracle is pushed directly.
            ProverFamily::HashOracle => {
                let block = self.dst.latest_block().await?;
                Ok(SettledBlock {
                    block,
                    assertion: None,
                })
            }
        }
    }

    /// Finds the latest assertion the registry confirmed as of the
    /// given L1 block, then resolves its after-state through the L1
    /// explorer's log index.
    async fn confirmed_assertion(
        &self,
        l1_block_number: u64,
    ) -> Result<ConfirmedAssertion> {
        let registry_address = self.oracle_address()?;
        let registry =
            RollupRegistry::new(registry_address, self.l1().provider());
        let node_index = registry
            .latest_confirmed()
            .block(l1_block_number)
            .call()
            .await?;
        let explorer = self.l1().explorer()?;
        let topic0 = <NodeCreatedFilter as ethers::contract::EthEvent>::signature();
        let topic1 = H256::from_low_u64_be(node_index);
        let logs = explorer
            .get_logs_by_topic1(registry_address, topic0, topic1, 0)
            .await?;
        let log = logs.first().ok_or(Error::ExplorerApi {
            message: format!(
                "no creation event for confirmed node {node_index}"
            ),
        })?;
        let event = NodeCreatedFilter::decode_log(&log.raw_log())?;
        Ok(ConfirmedAssertion {
            node_index,
            node_hash: H256(event.node_hash),
            parent_node_hash: H256(event.parent_node_hash),
            after_inbox_batch_acc: H256(event.after_inbox_batch_acc),
            state: assertion_after_state(&event),
        })
    }

    fn oracle_address(&self) -> Result<Address> {
        self.dst
            .config
            .contracts
            .l2_oracle
            .ok_or(Error::Generic("no l2 oracle configured"))
    }
}
