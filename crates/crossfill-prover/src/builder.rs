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

//! Builds a settlement proof for one request against the current
//! chain state.

use crossfill_chain::consensus::{
    derive_mock_beacon_root, execution_state_root_proof, BeaconApi,
    MOCK_STATE_ROOT_WITNESSES,
};
use crossfill_chain::{ActiveChains, SettledBlock};
use crossfill_codec::Attributes;
use crossfill_config::{AssertionSlotMode, ChainConfig, ProverFamily};
use crossfill_utils::{Error, Result};
use ethers::types::{
    Address, BlockId, Bytes, EIP1186ProofResponse, H256, U256, U64,
};

use crate::header::encode_block_header;
use crate::proof::{
    AccountProofParams, HashOracleProof, OutputRootProof, Proof,
    RollupAssertionProof, StateProofParams,
};
use crate::slots::{
    assertion_confirm_slot, fulfillment_info_slot, node_confirm_data_slot,
};

/// Finality delay of assertion-settled fulfillments, in seconds.
pub const ROLLUP_ASSERTION_FINALITY_DELAY: u64 = 3_600;
/// Finality delay of output-root-settled fulfillments, in seconds.
pub const OUTPUT_ROOT_FINALITY_DELAY: u64 = 604_800;

/// Whether a source/destination pair must be proven through the block
/// hash oracle instead of a shared L1.
pub fn uses_hash_oracle(src: &ChainConfig, dst: &ChainConfig) -> bool {
    !src.exposes_l1_state || !dst.shares_state_with_l1
}

/// How long a fulfillment must mature before its reward can be
/// claimed. Keyed on the proof scheme the pair actually uses: a
/// bridged pair goes through the hash oracle no matter what family the
/// destination settles with, so it matures on the attribute-declared
/// delay.
pub fn required_finality_delay(
    src: &ChainConfig,
    dst: &ChainConfig,
    attributes: &Attributes,
) -> Result<u64> {
    if !uses_hash_oracle(src, dst) {
        match dst.prover_family {
            ProverFamily::RollupAssertion { .. } => {
                return Ok(ROLLUP_ASSERTION_FINALITY_DELAY)
            }
            ProverFamily::OutputRoot => return Ok(OUTPUT_ROOT_FINALITY_DELAY),
            ProverFamily::HashOracle => {}
        }
    }
    let (finality_delay, _expiry) = attributes.delay()?;
    // The attribute is attacker-controlled; a delay past u64 seconds
    // can never mature and must not panic the caller.
    if finality_delay > U256::from(u64::MAX) {
        return Err(Error::Generic(
            "declared finality delay overflows u64 seconds",
        ));
    }
    Ok(finality_delay.as_u64())
}

/// A freshly built proof, together with the destination block it was
/// built against.
#[derive(Debug, Clone)]
pub struct BuiltProof {
    /// The proof itself.
    pub proof: Proof,
    /// Number of the proven destination block.
    pub destination_block_number: u64,
    /// Hash of the proven destination block.
    pub destination_block_hash: H256,
}

/// Builds proofs for one request's chain triple.
#[derive(Debug, Clone, Copy)]
pub struct ProofBuilder<'a> {
    chains: &'a ActiveChains,
}

impl<'a> ProofBuilder<'a> {
    /// Creates a builder over the request's chain triple.
    pub fn new(chains: &'a ActiveChains) -> Self {
        Self { chains }
    }

    /// Builds the proof for `request_hash`. `timestamp_cutoff`, when
    /// given, rejects state anchors older than the claim maturity so a
    /// claim never proves against a pre-fulfillment observation.
    pub async fn build(
        &self,
        request_hash: H256,
        timestamp_cutoff: Option<u64>,
    ) -> Result<BuiltProof> {
        let src = &self.chains.src.config;
        let dst = &self.chains.dst.config;
        if uses_hash_oracle(src, dst) {
            tracing::debug!(?request_hash, "proving through the hash oracle");
            return self.build_hash_oracle(request_hash).await;
        }
        tracing::debug!(
            ?request_hash,
            family = ?dst.prover_family,
            "proving through the shared L1"
        );
        let anchor = self.state_anchor(timestamp_cutoff).await?;
        let settled = self
            .chains
            .settled_destination_block(anchor.l1_block_number)
            .await?;
        let inbox_proof = self
            .inbox_proof(request_hash, block_number(&settled.block)?)
            .await?;

        match dst.prover_family {
            ProverFamily::RollupAssertion { slot_mode } => {
                self.build_rollup_assertion(
                    anchor, settled, inbox_proof, slot_mode,
                )
                .await
            }
            ProverFamily::OutputRoot => {
                self.build_output_root(anchor, settled, inbox_proof).await
            }
            ProverFamily::HashOracle => Err(Error::Generic(
                "hash oracle destinations cannot be proven through an L1",
            )),
        }
    }

    async fn build_hash_oracle(
        &self,
        request_hash: H256,
    ) -> Result<BuiltProof> {
        let block = self.chains.dst.latest_block().await?;
        let number = block_number(&block)?;
        let inbox_proof = self.inbox_proof(request_hash, number).await?;
        let encoded_block_header = encode_block_header(&block)?;
        Ok(BuiltProof {
            proof: Proof::HashOracle(HashOracleProof {
                encoded_block_header,
                inbox_proof,
            }),
            destination_block_number: number.as_u64(),
            destination_block_hash: block
                .hash
                .ok_or(Error::Generic("block has no hash"))?,
        })
    }

    async fn build_rollup_assertion(
        &self,
        anchor: StateAnchor,
        settled: SettledBlock,
        inbox_proof: AccountProofParams,
        slot_mode: AssertionSlotMode,
    ) -> Result<BuiltProof> {
        let assertion = settled
            .assertion
            .ok_or(Error::Generic("settled block carries no assertion"))?;
        let registry_slot_base = self.registry_slot_base()?;
        let registry_slot = match slot_mode {
            AssertionSlotMode::NodeIndex => node_confirm_data_slot(
                assertion.node_index,
                registry_slot_base,
            ),
            AssertionSlotMode::AssertionHash => {
                assertion_confirm_slot(&assertion, registry_slot_base)
            }
        };
        let registry_proof = self
            .l1_storage_proof(registry_slot, anchor.l1_block_number)
            .await?;
        let number = block_number(&settled.block)?;
        let hash = settled
            .block
            .hash
            .ok_or(Error::Generic("block has no hash"))?;
        let encoded_block_header = encode_block_header(&settled.block)?;
        Ok(BuiltProof {
            proof: Proof::RollupAssertion(RollupAssertionProof {
                encoded_block_header,
                after_state: assertion.state,
                prev_assertion_hash: assertion.parent_node_hash,
                sequencer_batch_acc: assertion.after_inbox_batch_acc,
                state_proof: anchor.state_proof,
                registry_proof,
                inbox_proof,
            }),
            destination_block_number: number.as_u64(),
            destination_block_hash: hash,
        })
    }

    async fn build_output_root(
        &self,
        anchor: StateAnchor,
        settled: SettledBlock,
        inbox_proof: AccountProofParams,
    ) -> Result<BuiltProof> {
        let anchor_slot = self.registry_slot_base()?;
        let anchor_proof = self
            .l1_storage_proof(anchor_slot, anchor.l1_block_number)
            .await?;
        let message_passer = self
            .chains
            .dst
            .config
            .contracts
            .message_passer
            .ok_or(Error::Generic("no message passer configured"))?;
        let number = block_number(&settled.block)?;
        let passer_account = self
            .chains
            .dst
            .get_proof(message_passer, Vec::new(), BlockId::Number(number.as_u64().into()))
            .await?;
        let hash = settled
            .block
            .hash
            .ok_or(Error::Generic("block has no hash"))?;
        Ok(BuiltProof {
            proof: Proof::OutputRoot(OutputRootProof {
                l2_state_root: settled.block.state_root,
                l2_message_passer_storage_root: passer_account.storage_hash,
                l2_block_hash: hash,
                state_proof: anchor.state_proof,
                anchor_proof,
                inbox_proof,
            }),
            destination_block_number: number.as_u64(),
            destination_block_hash: hash,
        })
    }

    /// Anchors the proof in L1 state the source chain can verify:
    /// either a real beacon block behind the source's exposed beacon
    /// root, or, on devnets, the finalized L1 block folded up the mock
    /// witness branch.
    async fn state_anchor(
        &self,
        timestamp_cutoff: Option<u64>,
    ) -> Result<StateAnchor> {
        let src = &self.chains.src.config;
        let anchor = if src.devnet {
            let l1_block = self.chains.l1().finalized_block().await?;
            let state_root = l1_block.state_root;
            StateAnchor {
                l1_block_number: block_number(&l1_block)?.as_u64(),
                state_proof: StateProofParams {
                    beacon_root: derive_mock_beacon_root(state_root),
                    beacon_oracle_timestamp: l1_block.timestamp,
                    execution_state_root: state_root,
                    state_root_proof: MOCK_STATE_ROOT_WITNESSES.to_vec(),
                },
            }
        } else {
            let (beacon_root, timestamp) =
                self.chains.exposed_beacon_root().await?;
            let api_url = src
                .beacon_api_url
                .as_ref()
                .ok_or(Error::Generic("no beacon api configured"))?;
            let api = BeaconApi::new(api_url.as_url().clone());
            let signed = api.block_by_root(beacon_root).await?;
            let inclusion = execution_state_root_proof(&signed.message);
            if inclusion.beacon_root != beacon_root {
                return Err(Error::Generic(
                    "beacon block does not merkleize to the requested root",
                ));
            }
            StateAnchor {
                l1_block_number: signed
                    .message
                    .body
                    .execution_payload
                    .block_number,
                state_proof: StateProofParams {
                    beacon_root,
                    beacon_oracle_timestamp: timestamp,
                    execution_state_root: inclusion.state_root,
                    state_root_proof: inclusion.witnesses,
                },
            }
        };
        if let Some(cutoff) = timestamp_cutoff {
            if anchor.state_proof.beacon_oracle_timestamp < U256::from(cutoff)
            {
                return Err(Error::Generic(
                    "anchored state predates the claim cutoff",
                ));
            }
        }
        Ok(anchor)
    }

    async fn inbox_proof(
        &self,
        request_hash: H256,
        block: U64,
    ) -> Result<AccountProofParams> {
        let dst = &self.chains.dst;
        let inbox = dst
            .config
            .contracts
            .inbox
            .ok_or(Error::Generic("no inbox configured"))?;
        let slot =
            fulfillment_info_slot(request_hash, dst.config.fulfillment_info_slot);
        let proof = dst
            .get_proof(inbox, vec![slot], BlockId::Number(block.as_u64().into()))
            .await?;
        account_params(proof, slot)
    }

    async fn l1_storage_proof(
        &self,
        slot: H256,
        l1_block_number: u64,
    ) -> Result<AccountProofParams> {
        let registry = self.oracle_address()?;
        let proof = self
            .chains
            .l1()
            .get_proof(
                registry,
                vec![slot],
                BlockId::Number(l1_block_number.into()),
            )
            .await?;
        account_params(proof, slot)
    }

    fn oracle_address(&self) -> Result<Address> {
        self.chains
            .dst
            .config
            .contracts
            .l2_oracle
            .ok_or(Error::Generic("no l2 oracle configured"))
    }

    fn registry_slot_base(&self) -> Result<H256> {
        self.chains
            .dst
            .config
            .l2_oracle_storage_key
            .ok_or(Error::Generic("no l2 oracle storage key configured"))
    }
}

struct StateAnchor {
    l1_block_number: u64,
    state_proof: StateProofParams,
}

fn block_number(block: &ethers::types::Block<H256>) -> Result<U64> {
    block.number.ok_or(Error::Generic("block has no number"))
}

/// Flattens an EIP-1186 response into the verifier's account proof
/// parameters. A zero value means the slot was never written, which
/// for every slot we prove signals a missing fulfillment or anchor,
/// so it aborts instead of producing a proof of absence.
fn account_params(
    proof: EIP1186ProofResponse,
    slot: H256,
) -> Result<AccountProofParams> {
    let storage = proof
        .storage_proof
        .into_iter()
        .next()
        .ok_or(Error::EmptyStorageProof { slot })?;
    if storage.value.is_zero() {
        return Err(Error::EmptyStorageProof { slot });
    }
    let mut key_bytes = [0u8; 32];
    storage.key.to_big_endian(&mut key_bytes);
    Ok(AccountProofParams {
        storage_key: key_bytes.to_vec().into(),
        storage_value: quantity_bytes(storage.value),
        account_proof: proof.account_proof,
        storage_proof: storage.proof,
    })
}

/// Minimal big-endian byte encoding of a storage value.
fn quantity_bytes(value: U256) -> Bytes {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    let skip = buf.iter().take_while(|b| **b == 0).count();
    buf[skip..].to_vec().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_config(json: serde_json::Value) -> ChainConfig {
        serde_json::from_value(json).unwrap()
    }

    fn base_chain(family: serde_json::Value) -> serde_json::Value {
        serde_json::json!({
            "name": "test",
            "chain-id": 31337,
            "http-endpoint": "http://localhost:8545",
            "prover-family": family,
        })
    }

    #[test]
    fn bridged_pairs_select_the_hash_oracle() {
        let mut src_json = base_chain(serde_json::json!({"family": "output-root"}));
        src_json["exposes-l1-state"] = serde_json::json!(false);
        let src = chain_config(src_json);
        let dst = chain_config(base_chain(
            serde_json::json!({"family": "rollup-assertion"}),
        ));
        assert!(uses_hash_oracle(&src, &dst));
    }

    #[test]
    fn shared_l1_pairs_prove_directly() {
        let src = chain_config(base_chain(
            serde_json::json!({"family": "output-root"}),
        ));
        let dst = chain_config(base_chain(
            serde_json::json!({"family": "rollup-assertion"}),
        ));
        assert!(!uses_hash_oracle(&src, &dst));
    }

    fn delay_attributes(seconds: U256) -> Attributes {
        use crossfill_codec::attributes::encode_delay_attribute;
        Attributes::new(vec![encode_delay_attribute(
            seconds,
            U256::from(9_999_999u64),
        )])
        .unwrap()
    }

    #[test]
    fn finality_delay_follows_the_family() {
        let attributes = Attributes::default();
        let src = chain_config(base_chain(
            serde_json::json!({"family": "output-root"}),
        ));
        let assertion = chain_config(base_chain(
            serde_json::json!({"family": "rollup-assertion"}),
        ));
        assert_eq!(
            required_finality_delay(&src, &assertion, &attributes).unwrap(),
            ROLLUP_ASSERTION_FINALITY_DELAY
        );
        let output_root = chain_config(base_chain(
            serde_json::json!({"family": "output-root"}),
        ));
        assert_eq!(
            required_finality_delay(&src, &output_root, &attributes).unwrap(),
            OUTPUT_ROOT_FINALITY_DELAY
        );
    }

    #[test]
    fn hash_oracle_delay_comes_from_the_attributes() {
        let attributes = delay_attributes(U256::from(120u64));
        let src = chain_config(base_chain(
            serde_json::json!({"family": "output-root"}),
        ));
        let oracle = chain_config(base_chain(
            serde_json::json!({"family": "hash-oracle"}),
        ));
        assert_eq!(
            required_finality_delay(&src, &oracle, &attributes).unwrap(),
            120
        );
    }

    #[test]
    fn bridged_pairs_mature_on_the_declared_delay() {
        // A source with no L1 exposure pushes the pair through the
        // hash oracle even when the destination settles by assertion,
        // so the fixed assertion delay does not apply.
        let attributes = delay_attributes(U256::from(45u64));
        let mut src_json =
            base_chain(serde_json::json!({"family": "output-root"}));
        src_json["exposes-l1-state"] = serde_json::json!(false);
        let src = chain_config(src_json);
        let assertion = chain_config(base_chain(
            serde_json::json!({"family": "rollup-assertion"}),
        ));
        assert!(uses_hash_oracle(&src, &assertion));
        assert_eq!(
            required_finality_delay(&src, &assertion, &attributes).unwrap(),
            45
        );
    }

    #[test]
    fn oversized_declared_delays_are_rejected() {
        let attributes = delay_attributes(U256::MAX);
        let src = chain_config(base_chain(
            serde_json::json!({"family": "output-root"}),
        ));
        let oracle = chain_config(base_chain(
            serde_json::json!({"family": "hash-oracle"}),
        ));
        let err =
            required_finality_delay(&src, &oracle, &attributes).unwrap_err();
        assert!(matches!(err, Error::Generic(_)));
    }

    #[test]
    fn storage_values_encode_minimally() {
        assert_eq!(quantity_bytes(U256::from(1u64)).to_vec(), vec![0x01]);
        assert_eq!(
            quantity_bytes(U256::from(0x0102u64)).to_vec(),
            vec![0x01, 0x02]
        );
        assert!(quantity_bytes(U256::zero()).to_vec().is_empty());
    }

    #[test]
    fn zero_storage_values_abort() {
        let slot = H256::repeat_byte(0x01);
        let response = EIP1186ProofResponse {
            storage_proof: vec![ethers::types::StorageProof {
                key: U256::from_big_endian(slot.as_bytes()),
                proof: vec![],
                value: U256::zero(),
            }],
            ..Default::default()
        };
        let err = account_params(response, slot).unwrap_err();
        assert!(matches!(err, Error::EmptyStorageProof { .. }));
    }
}
