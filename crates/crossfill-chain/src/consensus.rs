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

//! Deneb beacon block containers and the execution state root witness.
//!
//! The on-chain verifier checks a merkle witness from the execution
//! payload's `state_root` up to the beacon block root exposed by the
//! source chain. The path `body.execution_payload.state_root` has
//! generalized index 6434: depth 3 to `body` (field 4 of 5), depth 4 to
//! `execution_payload` (field 9 of 12), depth 5 to `state_root`
//! (field 2 of 17). The containers below are just enough of Deneb to
//! deserialize a signed block and merkleize those three levels.

use crossfill_utils::{Error, Result};
use ethereum_types::{H160, H256, U256};
use reqwest::header::ACCEPT;
use sha2::{Digest, Sha256};
use ssz::Decode;
use ssz_derive::{Decode, Encode};
use ssz_types::typenum::{
    U1048576, U1073741824, U128, U16, U2, U2048, U256 as TU256, U32, U33,
    U4096, U512, U96,
};
use ssz_types::{BitList, BitVector, FixedVector, VariableList};
use tree_hash::TreeHash;
use tree_hash_derive::TreeHash;

/// Generalized index of `body.execution_payload.state_root` in a
/// beacon block.
pub const EXECUTION_STATE_ROOT_GINDEX: u64 = 6434;

/// Number of witnesses in the state root branch (3 + 4 + 5 levels).
pub const EXECUTION_STATE_ROOT_DEPTH: usize = 12;

/// The fixed witness branch devnets fold their mocked beacon root
/// with, in place of a real consensus client.
pub const MOCK_STATE_ROOT_WITNESSES: [H256; EXECUTION_STATE_ROOT_DEPTH] =
    [H256::zero(); EXECUTION_STATE_ROOT_DEPTH];

type SignatureBytes = FixedVector<u8, U96>;
type PublicKeyBytes = FixedVector<u8, ssz_types::typenum::U48>;
type KzgCommitment = FixedVector<u8, ssz_types::typenum::U48>;
type Transaction = VariableList<u8, U1073741824>;

#[derive(Debug, Clone, PartialEq, Encode, Decode, TreeHash)]
pub struct Checkpoint {
    pub epoch: u64,
    pub root: H256,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode, TreeHash)]
pub struct AttestationData {
    pub slot: u64,
    pub index: u64,
    pub beacon_block_root: H256,
    pub source: Checkpoint,
    pub target: Checkpoint,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode, TreeHash)]
pub struct IndexedAttestation {
    pub attesting_indices: VariableList<u64, U2048>,
    pub data: AttestationData,
    pub signature: SignatureBytes,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode, TreeHash)]
pub struct Attestation {
    pub aggregation_bits: BitList<U2048>,
    pub data: AttestationData,
    pub signature: SignatureBytes,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode, TreeHash)]
pub struct BeaconBlockHeader {
    pub slot: u64,
    pub proposer_index: u64,
    pub parent_root: H256,
    pub state_root: H256,
    pub body_root: H256,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode, TreeHash)]
pub struct SignedBeaconBlockHeader {
    pub message: BeaconBlockHeader,
    pub signature: SignatureBytes,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode, TreeHash)]
pub struct ProposerSlashing {
    pub signed_header_1: SignedBeaconBlockHeader,
    pub signed_header_2: SignedBeaconBlockHeader,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode, TreeHash)]
pub struct AttesterSlashing {
    pub attestation_1: IndexedAttestation,
    pub attestation_2: IndexedAttestation,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode, TreeHash)]
pub struct Eth1Data {
    pub deposit_root: H256,
    pub deposit_count: u64,
    pub block_hash: H256,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode, TreeHash)]
pub struct DepositData {
    pub pubkey: PublicKeyBytes,
    pub withdrawal_credentials: H256,
    pub amount: u64,
    pub signature: SignatureBytes,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode, TreeHash)]
pub struct Deposit {
    pub proof: FixedVector<H256, U33>,
    pub data: DepositData,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode, TreeHash)]
pub struct VoluntaryExit {
    pub epoch: u64,
    pub validator_index: u64,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode, TreeHash)]
pub struct SignedVoluntaryExit {
    pub message: VoluntaryExit,
    pub signature: SignatureBytes,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode, TreeHash)]
pub struct SyncAggregate {
    pub sync_committee_bits: BitVector<U512>,
    pub sync_committee_signature: SignatureBytes,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode, TreeHash)]
pub struct BlsToExecutionChange {
    pub validator_index: u64,
    pub from_bls_pubkey: PublicKeyBytes,
    pub to_execution_address: H160,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode, TreeHash)]
pub struct SignedBlsToExecutionChange {
    pub message: BlsToExecutionChange,
    pub signature: SignatureBytes,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode, TreeHash)]
pub struct Withdrawal {
    pub index: u64,
    pub validator_index: u64,
    pub address: H160,
    pub amount: u64,
}

/// Deneb execution payload. 17 fields, `state_root` is field 2.
#[derive(Debug, Clone, PartialEq, Encode, Decode, TreeHash)]
pub struct ExecutionPayload {
    pub parent_hash: H256,
    pub fee_recipient: H160,
    pub state_root: H256,
    pub receipts_root: H256,
    pub logs_bloom: FixedVector<u8, TU256>,
    pub prev_randao: H256,
    pub block_number: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub timestamp: u64,
    pub extra_data: VariableList<u8, U32>,
    pub base_fee_per_gas: U256,
    pub block_hash: H256,
    pub transactions: VariableList<Transaction, U1048576>,
    pub withdrawals: VariableList<Withdrawal, U16>,
    pub blob_gas_used: u64,
    pub excess_blob_gas: u64,
}

/// Deneb beacon block body. 12 fields, `execution_payload` is field 9.
#[derive(Debug, Clone, PartialEq, Encode, Decode, TreeHash)]
pub struct BeaconBlockBody {
    pub randao_reveal: SignatureBytes,
    pub eth1_data: Eth1Data,
    pub graffiti: H256,
    pub proposer_slashings: VariableList<ProposerSlashing, U16>,
    pub attester_slashings: VariableList<AttesterSlashing, U2>,
    pub attestations: VariableList<Attestation, U128>,
    pub deposits: VariableList<Deposit, U16>,
    pub voluntary_exits: VariableList<SignedVoluntaryExit, U16>,
    pub sync_aggregate: SyncAggregate,
    pub execution_payload: ExecutionPayload,
    pub bls_to_execution_changes: VariableList<SignedBlsToExecutionChange, U16>,
    pub blob_kzg_commitments: VariableList<KzgCommitment, U4096>,
}

/// Deneb beacon block. 5 fields, `body` is field 4.
#[derive(Debug, Clone, PartialEq, Encode, Decode, TreeHash)]
pub struct BeaconBlock {
    pub slot: u64,
    pub proposer_index: u64,
    pub parent_root: H256,
    pub state_root: H256,
    pub body: BeaconBlockBody,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode, TreeHash)]
pub struct SignedBeaconBlock {
    pub message: BeaconBlock,
    pub signature: SignatureBytes,
}

fn hash_pair(left: &H256, right: &H256) -> H256 {
    let mut hasher = Sha256::new();
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    H256::from_slice(&hasher.finalize())
}

/// Merkleizes `leaves` into a tree of the given depth and returns the
/// root together with the sibling branch of `index`, bottom-up.
fn merkleize_with_branch(
    leaves: &[H256],
    depth: usize,
    index: usize,
) -> (H256, Vec<H256>) {
    let width = 1usize << depth;
    debug_assert!(leaves.len() <= width && index < leaves.len());
    let mut layer = leaves.to_vec();
    layer.resize(width, H256::zero());
    let mut branch = Vec::with_capacity(depth);
    let mut idx = index;
    for _ in 0..depth {
        branch.push(layer[idx ^ 1]);
        layer = layer
            .chunks(2)
            .map(|pair| hash_pair(&pair[0], &pair[1]))
            .collect();
        idx /= 2;
    }
    (layer[0], branch)
}

/// Folds a leaf up a witness branch along the bit path of the
/// generalized index.
pub fn fold_branch(leaf: H256, branch: &[H256], gindex: u64) -> H256 {
    let mut node = leaf;
    let mut g = gindex;
    for witness in branch {
        node = if g & 1 == 1 {
            hash_pair(witness, &node)
        } else {
            hash_pair(&node, witness)
        };
        g >>= 1;
    }
    node
}

/// The execution state root of a beacon block together with its
/// witness branch up to the beacon block root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateRootInclusion {
    /// The execution payload's state root (the proven leaf).
    pub state_root: H256,
    /// Sibling witnesses, bottom-up, `EXECUTION_STATE_ROOT_DEPTH` of
    /// them.
    pub witnesses: Vec<H256>,
    /// The beacon block root the branch folds up to.
    pub beacon_root: H256,
}

/// Builds the execution state root witness for a beacon block.
pub fn execution_state_root_proof(block: &BeaconBlock) -> StateRootInclusion {
    let payload = &block.body.execution_payload;
    let payload_leaves = [
        payload.parent_hash.tree_hash_root(),
        payload.fee_recipient.tree_hash_root(),
        payload.state_root.tree_hash_root(),
        payload.receipts_root.tree_hash_root(),
        payload.logs_bloom.tree_hash_root(),
        payload.prev_randao.tree_hash_root(),
        payload.block_number.tree_hash_root(),
        payload.gas_limit.tree_hash_root(),
        payload.gas_used.tree_hash_root(),
        payload.timestamp.tree_hash_root(),
        payload.extra_data.tree_hash_root(),
        payload.base_fee_per_gas.tree_hash_root(),
        payload.block_hash.tree_hash_root(),
        payload.transactions.tree_hash_root(),
        payload.withdrawals.tree_hash_root(),
        payload.blob_gas_used.tree_hash_root(),
        payload.excess_blob_gas.tree_hash_root(),
    ];
    let (payload_root, payload_branch) =
        merkleize_with_branch(&payload_leaves, 5, 2);

    let body = &block.body;
    let body_leaves = [
        body.randao_reveal.tree_hash_root(),
        body.eth1_data.tree_hash_root(),
        body.graffiti.tree_hash_root(),
        body.proposer_slashings.tree_hash_root(),
        body.attester_slashings.tree_hash_root(),
        body.attestations.tree_hash_root(),
        body.deposits.tree_hash_root(),
        body.voluntary_exits.tree_hash_root(),
        body.sync_aggregate.tree_hash_root(),
        payload_root,
        body.bls_to_execution_changes.tree_hash_root(),
        body.blob_kzg_commitments.tree_hash_root(),
    ];
    let (body_root, body_branch) = merkleize_with_branch(&body_leaves, 4, 9);

    let block_leaves = [
        block.slot.tree_hash_root(),
        block.proposer_index.tree_hash_root(),
        block.parent_root.tree_hash_root(),
        block.state_root.tree_hash_root(),
        body_root,
    ];
    let (beacon_root, block_branch) =
        merkleize_with_branch(&block_leaves, 3, 4);

    let witnesses = payload_branch
        .into_iter()
        .chain(body_branch)
        .chain(block_branch)
        .collect();
    StateRootInclusion {
        state_root: payload.state_root,
        witnesses,
        beacon_root,
    }
}

/// Derives the beacon root a devnet verifier expects, by folding the
/// execution state root up the fixed mock branch.
pub fn derive_mock_beacon_root(state_root: H256) -> H256 {
    fold_branch(
        state_root,
        &MOCK_STATE_ROOT_WITNESSES,
        EXECUTION_STATE_ROOT_GINDEX,
    )
}

/// A consensus-layer REST client, only used to fetch blocks by root.
#[derive(Debug, Clone)]
pub struct BeaconApi {
    http: reqwest::Client,
    base: url::Url,
}

impl BeaconApi {
    /// Creates a new client for the given REST endpoint.
    pub fn new(base: url::Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            base,
        }
    }

    /// Fetches the SSZ-encoded signed block with the given root.
    ///
    /// A `404` maps to [`Error::MissingConsensusBlock`], which callers
    /// must treat as permanent: the chain will never backfill a block
    /// it does not have.
    pub async fn block_by_root(&self, root: H256) -> Result<SignedBeaconBlock> {
        let url = self
            .base
            .join(&format!("eth/v2/beacon/blocks/{root:?}"))?;
        tracing::trace!(%url, "fetching beacon block");
        let response = self
            .http
            .get(url)
            .header(ACCEPT, "application/octet-stream")
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await?;
        let status = response.status();
        if status.as_u16() == 404 {
            return Err(Error::MissingConsensusBlock { root });
        }
        if !status.is_success() {
            return Err(Error::ConsensusApi {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        let bytes = response.bytes().await?;
        Ok(SignedBeaconBlock::from_ssz_bytes(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_payload() -> ExecutionPayload {
        ExecutionPayload {
            parent_hash: H256::repeat_byte(0x01),
            fee_recipient: H160::repeat_byte(0x02),
            state_root: H256::repeat_byte(0x03),
            receipts_root: H256::repeat_byte(0x04),
            logs_bloom: FixedVector::from_elem(0),
            prev_randao: H256::repeat_byte(0x05),
            block_number: 7,
            gas_limit: 30_000_000,
            gas_used: 21_000,
            timestamp: 1_700_000_000,
            extra_data: VariableList::empty(),
            base_fee_per_gas: U256::from(7u64),
            block_hash: H256::repeat_byte(0x06),
            transactions: VariableList::empty(),
            withdrawals: VariableList::empty(),
            blob_gas_used: 0,
            excess_blob_gas: 0,
        }
    }

    fn empty_block() -> BeaconBlock {
        BeaconBlock {
            slot: 123,
            proposer_index: 42,
            parent_root: H256::repeat_byte(0x0a),
            state_root: H256::repeat_byte(0x0b),
            body: BeaconBlockBody {
                randao_reveal: FixedVector::from_elem(0),
                eth1_data: Eth1Data {
                    deposit_root: H256::zero(),
                    deposit_count: 0,
                    block_hash: H256::zero(),
                },
                graffiti: H256::zero(),
                proposer_slashings: VariableList::empty(),
                attester_slashings: VariableList::empty(),
                attestations: VariableList::empty(),
                deposits: VariableList::empty(),
                voluntary_exits: VariableList::empty(),
                sync_aggregate: SyncAggregate {
                    sync_committee_bits: BitVector::new(),
                    sync_committee_signature: FixedVector::from_elem(0),
                },
                execution_payload: empty_payload(),
                bls_to_execution_changes: VariableList::empty(),
                blob_kzg_commitments: VariableList::empty(),
            },
        }
    }

    #[test]
    fn witness_branch_folds_back_to_the_beacon_root() {
        let block = empty_block();
        let inclusion = execution_state_root_proof(&block);
        assert_eq!(inclusion.witnesses.len(), EXECUTION_STATE_ROOT_DEPTH);
        assert_eq!(inclusion.state_root, H256::repeat_byte(0x03));
        let folded = fold_branch(
            inclusion.state_root,
            &inclusion.witnesses,
            EXECUTION_STATE_ROOT_GINDEX,
        );
        assert_eq!(folded, inclusion.beacon_root);
    }

    #[test]
    fn beacon_root_matches_tree_hash() {
        // The hand-rolled three-level merkleization must agree with the
        // derived tree hash of the container.
        let block = empty_block();
        let inclusion = execution_state_root_proof(&block);
        assert_eq!(inclusion.beacon_root, block.tree_hash_root());
    }

    #[test]
    fn tampered_witness_changes_the_root() {
        let block = empty_block();
        let inclusion = execution_state_root_proof(&block);
        let mut witnesses = inclusion.witnesses.clone();
        witnesses[3] = H256::repeat_byte(0xff);
        let folded = fold_branch(
            inclusion.state_root,
            &witnesses,
            EXECUTION_STATE_ROOT_GINDEX,
        );
        assert_ne!(folded, inclusion.beacon_root);
    }

    #[test]
    fn ssz_round_trip() {
        use ssz::Encode;
        let signed = SignedBeaconBlock {
            message: empty_block(),
            signature: FixedVector::from_elem(0),
        };
        let bytes = signed.as_ssz_bytes();
        let decoded = SignedBeaconBlock::from_ssz_bytes(&bytes).unwrap();
        assert_eq!(decoded, signed);
    }
}
